//! Wire signatures and Kotlin display names.
//!
//! Wire signatures follow the runtime's descriptor grammar: `Z B C S I J F D V`
//! for primitives, `Lpkg/Class;` for classes, `[T` for arrays and
//! `(params)ret` for methods. Display names are the Kotlin spelling used when
//! listing bindings, e.g. `java.util.List<Int>` or `(arg0: Int): Boolean`.

use std::borrow::Cow;
use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::arg_type::ArgType;
use crate::sys::{JObject, JValue};

/// Leading character of a wire signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TypeTag {
    Boolean = b'Z',
    Byte = b'B',
    Char = b'C',
    Short = b'S',
    Int = b'I',
    Long = b'J',
    Float = b'F',
    Double = b'D',
    Void = b'V',
    Object = b'L',
    Array = b'[',
}

impl TypeTag {
    /// Tag of the first type in `signature`.
    pub fn of_signature(signature: &str) -> Option<TypeTag> {
        let first = *signature.as_bytes().first()?;
        TypeTag::try_from(first).ok()
    }

    /// The value returned to the runtime when a call fails with an exception.
    pub fn zero_value(self) -> JValue {
        match self {
            TypeTag::Boolean => JValue::Boolean(false),
            TypeTag::Byte => JValue::Byte(0),
            TypeTag::Char => JValue::Char(0),
            TypeTag::Short => JValue::Short(0),
            TypeTag::Int => JValue::Int(0),
            TypeTag::Long => JValue::Long(0),
            TypeTag::Float => JValue::Float(0.0),
            TypeTag::Double => JValue::Double(0.0),
            TypeTag::Void => JValue::Void,
            TypeTag::Object | TypeTag::Array => JValue::Object(JObject::NULL),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let byte: u8 = (*self).into();
        write!(f, "{}", byte as char)
    }
}

/// Last path segment of a slash- or dot-separated class name.
pub fn simple_name(class_name: &str) -> &str {
    match class_name.rfind(['/', '.']) {
        Some(pos) => &class_name[pos + 1..],
        None => class_name,
    }
}

/// Kotlin spelling of a generic specialization, e.g. `java.util.Map<String, Int>`.
pub fn kotlin_specialization(template: &str, args: &[&str]) -> String {
    format!("{}<{}>", template, args.join(", "))
}

/// Wire signature and Kotlin name of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub signature: Cow<'static, str>,
    pub kotlin: Cow<'static, str>,
}

impl TypeDescriptor {
    pub fn of<T: ArgType>() -> Self {
        Self {
            signature: T::type_sig(),
            kotlin: T::kotlin_type(),
        }
    }
}

/// Parameter and return types of a bound callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub params: Vec<TypeDescriptor>,
    pub ret: TypeDescriptor,
}

impl FunctionDescriptor {
    pub fn new(params: Vec<TypeDescriptor>, ret: TypeDescriptor) -> Self {
        Self { params, ret }
    }

    /// Method descriptor used for lookup and registration, e.g. `(ILjava/lang/String;)Z`.
    pub fn signature(&self) -> String {
        let mut sig = String::from("(");
        for param in &self.params {
            sig.push_str(&param.signature);
        }
        sig.push(')');
        sig.push_str(&self.ret.signature);
        sig
    }

    /// Kotlin member signature, e.g. `(arg0: Int, arg1: String): Boolean`.
    pub fn kotlin_member(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| format!("arg{}: {}", i, param.kotlin))
            .collect();
        format!("({}): {}", params.join(", "), self.ret.kotlin)
    }

    /// Kotlin function type, e.g. `(Int, String) -> Boolean`.
    pub fn kotlin_lambda(&self) -> String {
        let params: Vec<&str> = self.params.iter().map(|p| &*p.kotlin).collect();
        format!("({}) -> {}", params.join(", "), self.ret.kotlin)
    }
}

/// Erased `invoke` descriptor of a Kotlin `FunctionN` object.
pub fn erased_invoke_sig(arity: usize) -> String {
    format!("({})Ljava/lang/Object;", "Ljava/lang/Object;".repeat(arity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(signature: &'static str, kotlin: &'static str) -> TypeDescriptor {
        TypeDescriptor {
            signature: signature.into(),
            kotlin: kotlin.into(),
        }
    }

    #[test]
    fn tags_round_trip_through_chars() {
        assert_eq!(TypeTag::of_signature("I"), Some(TypeTag::Int));
        assert_eq!(TypeTag::of_signature("Ljava/lang/String;"), Some(TypeTag::Object));
        assert_eq!(TypeTag::of_signature("[J"), Some(TypeTag::Array));
        assert_eq!(TypeTag::of_signature("Q"), None);
        assert_eq!(TypeTag::of_signature(""), None);
        assert_eq!(TypeTag::Long.to_string(), "J");
    }

    #[test]
    fn zero_values_match_tags() {
        assert_eq!(TypeTag::Int.zero_value(), JValue::Int(0));
        assert_eq!(TypeTag::Void.zero_value(), JValue::Void);
        assert_eq!(TypeTag::Array.zero_value(), JValue::Object(JObject::NULL));
    }

    #[test]
    fn simple_names() {
        assert_eq!(simple_name("com/kheiron/ktbind/Sample"), "Sample");
        assert_eq!(simple_name("com.kheiron.ktbind.Data"), "Data");
        assert_eq!(simple_name("Top"), "Top");
    }

    #[test]
    fn kotlin_generic_names() {
        assert_eq!(
            kotlin_specialization("java.util.Map", &["String", "java.util.List<String>"]),
            "java.util.Map<String, java.util.List<String>>"
        );
    }

    #[test]
    fn function_descriptor_renders_all_forms() {
        let f = FunctionDescriptor::new(
            vec![desc("I", "Int"), desc("Ljava/lang/String;", "String")],
            desc("Z", "Boolean"),
        );
        assert_eq!(f.signature(), "(ILjava/lang/String;)Z");
        assert_eq!(f.kotlin_member(), "(arg0: Int, arg1: String): Boolean");
        assert_eq!(f.kotlin_lambda(), "(Int, String) -> Boolean");

        let unit = FunctionDescriptor::new(vec![], desc("V", "Unit"));
        assert_eq!(unit.signature(), "()V");
        assert_eq!(unit.kotlin_member(), "(): Unit");
    }

    #[test]
    fn erased_invoke() {
        assert_eq!(erased_invoke_sig(0), "()Ljava/lang/Object;");
        assert_eq!(
            erased_invoke_sig(2),
            "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;"
        );
    }
}
