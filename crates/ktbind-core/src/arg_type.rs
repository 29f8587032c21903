//! Compile-time type bindings.
//!
//! [`ArgType`] associates a native type with its boundary representation: the
//! wire signature, the Kotlin display name and the conversion pair. A type
//! without an implementation cannot appear in a bound function's signature;
//! the compiler rejects it and names the offending type.
//!
//! Numeric types map by size. Types of at most four bytes use the 32-bit
//! boundary integer and types of at most eight bytes the 64-bit one. Each
//! mapping asserts at compile time that the native and boundary representations
//! have exactly the same size.

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::refs::{GlobalRef, LocalClassRef, LocalRef};
use crate::signature::TypeTag;
use crate::sys::{JObject, JValue, JniEnv, PrimitiveKind, Region, RegionMut};

/// A type that can cross the native boundary.
#[diagnostic::on_unimplemented(
    message = "`{Self}` has no binding to the managed runtime",
    label = "`{Self}` cannot cross the native boundary",
    note = "declare it with `#[derive(DataClass)]` or `#[derive(NativeClass)]`, or use a primitive, `String`, a collection or a `Function`"
)]
pub trait ArgType: Sized {
    /// Kind of boundary value this type travels as.
    const TAG: TypeTag;

    /// Kind of boundary value a `Vec<Self>` travels as.
    const VEC_TAG: TypeTag = TypeTag::Object;

    fn type_sig() -> Cow<'static, str>;

    fn kotlin_type() -> Cow<'static, str>;

    /// Boundary to native. Object handles in `value` stay owned by the caller.
    fn native_value(env: &JniEnv, value: JValue) -> Result<Self>;

    /// Native to boundary. A returned object handle is a new local reference
    /// owned by the caller.
    fn java_value(env: &JniEnv, value: Self) -> Result<JValue>;

    /// Converts to an object suitable for a generic container. Primitives box.
    fn java_box(env: &JniEnv, value: Self) -> Result<JObject> {
        Self::java_value(env, value)?.l()
    }

    /// Inverse of [`java_box`](ArgType::java_box).
    fn java_unbox(env: &JniEnv, obj: JObject) -> Result<Self> {
        Self::native_value(env, JValue::Object(obj))
    }

    fn vec_type_sig() -> Cow<'static, str> {
        Cow::Borrowed("Ljava/util/List;")
    }

    fn vec_kotlin_type() -> Cow<'static, str> {
        Cow::Owned(format!("java.util.List<{}>", Self::kotlin_type()))
    }

    /// Boundary to native for `Vec<Self>`. Lists by default, arrays for primitives.
    fn native_vec(env: &JniEnv, value: JValue) -> Result<Vec<Self>> {
        crate::collections::native_list(env, value)
    }

    fn java_vec(env: &JniEnv, values: Vec<Self>) -> Result<JValue> {
        crate::collections::java_list(env, values)
    }
}

/// Extracts a non-null object handle from `value`.
pub(crate) fn non_null(value: JValue, what: impl FnOnce() -> String) -> Result<JObject> {
    let obj = value.l()?;
    if obj.is_null() {
        return Err(Error::NullReference(what()));
    }
    Ok(obj)
}

fn box_primitive(env: &JniEnv, class: &str, signature: &str, value: JValue) -> Result<JObject> {
    let class = LocalClassRef::find(env, class)?;
    let value_of = class.static_method("valueOf", signature)?;
    value_of.call(env, class.as_obj(), &[value])?.l()
}

fn unbox_primitive(
    env: &JniEnv,
    obj: JObject,
    class: &str,
    method: &str,
    signature: &str,
) -> Result<JValue> {
    if obj.is_null() {
        return Err(Error::NullReference(class.replace('/', ".")));
    }
    let class = LocalClassRef::find(env, class)?;
    class.method(method, signature)?.call(env, obj, &[])
}

macro_rules! primitive_arg_type {
    (
        $ty:ty => $java:ty, $variant:ident, $kind:ident,
        sig = $sig:literal, kotlin = $kotlin:literal,
        box = $box_class:literal, unbox = $unbox:literal
    ) => {
        const _: () = assert!(
            std::mem::size_of::<$ty>() == std::mem::size_of::<$java>(),
            concat!("size mismatch between ", stringify!($ty), " and ", stringify!($java))
        );

        impl ArgType for $ty {
            const TAG: TypeTag = TypeTag::$variant;
            const VEC_TAG: TypeTag = TypeTag::Array;

            fn type_sig() -> Cow<'static, str> {
                Cow::Borrowed($sig)
            }

            fn kotlin_type() -> Cow<'static, str> {
                Cow::Borrowed($kotlin)
            }

            fn native_value(_env: &JniEnv, value: JValue) -> Result<Self> {
                match value {
                    JValue::$variant(v) => Ok(v as $ty),
                    other => Err(Error::mismatch(TypeTag::$variant, &other)),
                }
            }

            fn java_value(_env: &JniEnv, value: Self) -> Result<JValue> {
                Ok(JValue::$variant(value as $java))
            }

            fn java_box(env: &JniEnv, value: Self) -> Result<JObject> {
                box_primitive(
                    env,
                    $box_class,
                    concat!("(", $sig, ")L", $box_class, ";"),
                    JValue::$variant(value as $java),
                )
            }

            fn java_unbox(env: &JniEnv, obj: JObject) -> Result<Self> {
                let value = unbox_primitive(env, obj, $box_class, $unbox, concat!("()", $sig))?;
                Self::native_value(env, value)
            }

            fn vec_type_sig() -> Cow<'static, str> {
                Cow::Borrowed(concat!("[", $sig))
            }

            fn vec_kotlin_type() -> Cow<'static, str> {
                Cow::Borrowed(concat!($kotlin, "Array"))
            }

            fn native_vec(env: &JniEnv, value: JValue) -> Result<Vec<Self>> {
                let array = non_null(value, || concat!($kotlin, "Array").to_owned())?;
                let len = env.get_array_length(array);
                let mut buf: Vec<$java> = vec![Default::default(); len.max(0) as usize];
                env.get_array_region(array, 0, RegionMut::$variant(&mut buf));
                crate::error::check_pending(env)?;
                Ok(buf.into_iter().map(|v| v as $ty).collect())
            }

            fn java_vec(env: &JniEnv, values: Vec<Self>) -> Result<JValue> {
                let len = i32::try_from(values.len())
                    .map_err(|_| Error::Conversion("array too large".into()))?;
                let array = env.new_primitive_array(PrimitiveKind::$kind, len);
                if array.is_null() {
                    return Err(Error::pending_or(
                        env,
                        Error::Conversion(concat!("cannot allocate ", $kotlin, "Array").into()),
                    ));
                }
                let array = LocalRef::new(env, array);
                let buf: Vec<$java> = values.into_iter().map(|v| v as $java).collect();
                env.set_array_region(array.as_obj(), 0, Region::$variant(&buf));
                crate::error::check_pending(env)?;
                Ok(JValue::Object(array.into_raw()))
            }
        }
    };
}

primitive_arg_type!(bool => bool, Boolean, Boolean,
    sig = "Z", kotlin = "Boolean", box = "java/lang/Boolean", unbox = "booleanValue");
primitive_arg_type!(i8 => i8, Byte, Byte,
    sig = "B", kotlin = "Byte", box = "java/lang/Byte", unbox = "byteValue");
primitive_arg_type!(u8 => i8, Byte, Byte,
    sig = "B", kotlin = "Byte", box = "java/lang/Byte", unbox = "byteValue");
primitive_arg_type!(u16 => u16, Char, Char,
    sig = "C", kotlin = "Char", box = "java/lang/Character", unbox = "charValue");
primitive_arg_type!(i16 => i16, Short, Short,
    sig = "S", kotlin = "Short", box = "java/lang/Short", unbox = "shortValue");
primitive_arg_type!(i32 => i32, Int, Int,
    sig = "I", kotlin = "Int", box = "java/lang/Integer", unbox = "intValue");
primitive_arg_type!(u32 => i32, Int, Int,
    sig = "I", kotlin = "Int", box = "java/lang/Integer", unbox = "intValue");
primitive_arg_type!(i64 => i64, Long, Long,
    sig = "J", kotlin = "Long", box = "java/lang/Long", unbox = "longValue");
primitive_arg_type!(u64 => i64, Long, Long,
    sig = "J", kotlin = "Long", box = "java/lang/Long", unbox = "longValue");
primitive_arg_type!(f32 => f32, Float, Float,
    sig = "F", kotlin = "Float", box = "java/lang/Float", unbox = "floatValue");
primitive_arg_type!(f64 => f64, Double, Double,
    sig = "D", kotlin = "Double", box = "java/lang/Double", unbox = "doubleValue");

#[cfg(target_pointer_width = "64")]
primitive_arg_type!(isize => i64, Long, Long,
    sig = "J", kotlin = "Long", box = "java/lang/Long", unbox = "longValue");
#[cfg(target_pointer_width = "64")]
primitive_arg_type!(usize => i64, Long, Long,
    sig = "J", kotlin = "Long", box = "java/lang/Long", unbox = "longValue");
#[cfg(target_pointer_width = "32")]
primitive_arg_type!(isize => i32, Int, Int,
    sig = "I", kotlin = "Int", box = "java/lang/Integer", unbox = "intValue");
#[cfg(target_pointer_width = "32")]
primitive_arg_type!(usize => i32, Int, Int,
    sig = "I", kotlin = "Int", box = "java/lang/Integer", unbox = "intValue");

impl ArgType for () {
    const TAG: TypeTag = TypeTag::Void;

    fn type_sig() -> Cow<'static, str> {
        Cow::Borrowed("V")
    }

    fn kotlin_type() -> Cow<'static, str> {
        Cow::Borrowed("Unit")
    }

    fn native_value(_env: &JniEnv, _value: JValue) -> Result<Self> {
        Ok(())
    }

    fn java_value(_env: &JniEnv, _value: Self) -> Result<JValue> {
        Ok(JValue::Void)
    }

    fn java_box(_env: &JniEnv, _value: Self) -> Result<JObject> {
        Ok(JObject::NULL)
    }

    fn java_unbox(_env: &JniEnv, _obj: JObject) -> Result<Self> {
        Ok(())
    }
}

impl ArgType for String {
    const TAG: TypeTag = TypeTag::Object;

    fn type_sig() -> Cow<'static, str> {
        Cow::Borrowed("Ljava/lang/String;")
    }

    fn kotlin_type() -> Cow<'static, str> {
        Cow::Borrowed("String")
    }

    fn native_value(env: &JniEnv, value: JValue) -> Result<Self> {
        let string = non_null(value, || "java.lang.String".to_owned())?;
        env.get_string_utf_chars(string).ok_or_else(|| {
            Error::pending_or(env, Error::Conversion("cannot read string contents".into()))
        })
    }

    fn java_value(env: &JniEnv, value: Self) -> Result<JValue> {
        let string = env.new_string_utf(&value);
        if string.is_null() {
            return Err(Error::pending_or(
                env,
                Error::Conversion("cannot allocate string".into()),
            ));
        }
        Ok(JValue::Object(string))
    }
}

/// Any managed object, passed through unconverted. Null is allowed.
impl ArgType for GlobalRef {
    const TAG: TypeTag = TypeTag::Object;

    fn type_sig() -> Cow<'static, str> {
        Cow::Borrowed("Ljava/lang/Object;")
    }

    fn kotlin_type() -> Cow<'static, str> {
        Cow::Borrowed("Any?")
    }

    fn native_value(env: &JniEnv, value: JValue) -> Result<Self> {
        Ok(GlobalRef::new(env, value.l()?))
    }

    fn java_value(env: &JniEnv, value: Self) -> Result<JValue> {
        if value.is_null() {
            return Ok(JValue::Object(JObject::NULL));
        }
        let local = env.new_local_ref(value.as_obj());
        if local.is_null() {
            return Err(Error::pending_or(
                env,
                Error::Conversion("cannot create a local reference".into()),
            ));
        }
        Ok(JValue::Object(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_signatures() {
        assert_eq!(bool::type_sig(), "Z");
        assert_eq!(i8::type_sig(), "B");
        assert_eq!(u8::type_sig(), "B");
        assert_eq!(u16::type_sig(), "C");
        assert_eq!(i16::type_sig(), "S");
        assert_eq!(i32::type_sig(), "I");
        assert_eq!(u32::type_sig(), "I");
        assert_eq!(i64::type_sig(), "J");
        assert_eq!(u64::type_sig(), "J");
        assert_eq!(f32::type_sig(), "F");
        assert_eq!(f64::type_sig(), "D");
        assert_eq!(<()>::type_sig(), "V");
        assert_eq!(String::type_sig(), "Ljava/lang/String;");
        assert_eq!(GlobalRef::type_sig(), "Ljava/lang/Object;");
    }

    #[test]
    fn pointer_sized_integers_follow_target_width() {
        #[cfg(target_pointer_width = "64")]
        assert_eq!(usize::type_sig(), "J");
        #[cfg(target_pointer_width = "32")]
        assert_eq!(usize::type_sig(), "I");
        assert_eq!(isize::type_sig(), usize::type_sig());
    }

    #[test]
    fn kotlin_names() {
        assert_eq!(i32::kotlin_type(), "Int");
        assert_eq!(u16::kotlin_type(), "Char");
        assert_eq!(<()>::kotlin_type(), "Unit");
        assert_eq!(String::kotlin_type(), "String");
        assert_eq!(i32::vec_kotlin_type(), "IntArray");
        assert_eq!(String::vec_kotlin_type(), "java.util.List<String>");
        assert_eq!(i64::vec_type_sig(), "[J");
        assert_eq!(String::vec_type_sig(), "Ljava/util/List;");
    }

    #[test]
    fn vec_tags() {
        assert_eq!(<i32 as ArgType>::VEC_TAG, TypeTag::Array);
        assert_eq!(<String as ArgType>::VEC_TAG, TypeTag::Object);
    }
}
