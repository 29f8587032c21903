//! Class definitions and member lookup.
//!
//! Methods and fields are identified by an xxh64 hash of name and signature.
//! Lookup (`get_method_id`) searches the class, its superclasses and its
//! interfaces; dispatch (`call_method`) searches the runtime class of the
//! receiver and its superclasses for a concrete implementation.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use ktbind_core::NativeFn;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh64::xxh64;

use crate::env::ThreadEnv;
use crate::error::{Throw, VmError};
use crate::heap::Body;
use crate::value::{ObjId, Val};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassFlags: u8 {
        const ABSTRACT = 1 << 0;
        const INTERFACE = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodFlags: u8 {
        const STATIC = 1 << 0;
        const NATIVE = 1 << 1;
        const ABSTRACT = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

pub(crate) fn member_key(name: &str, signature: &str) -> u64 {
    let mut bytes = Vec::with_capacity(name.len() + signature.len() + 1);
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(b':');
    bytes.extend_from_slice(signature.as_bytes());
    xxh64(&bytes, 0)
}

/// Number of parameters in a method signature such as `(I[JLjava/lang/String;)V`.
pub(crate) fn parameter_count(signature: &str) -> Option<usize> {
    let params = signature.strip_prefix('(')?.split_once(')')?.0;
    let mut chars = params.chars();
    let mut count = 0;
    while let Some(c) = chars.next() {
        let mut c = c;
        while c == '[' {
            c = chars.next()?;
        }
        match c {
            'Z' | 'B' | 'C' | 'S' | 'I' | 'J' | 'F' | 'D' => {}
            'L' => {
                chars.by_ref().find(|&c| c == ';')?;
            }
            _ => return None,
        }
        count += 1;
    }
    Some(count)
}

/// Runtime-implemented method body.
pub type Builtin = Arc<dyn Fn(&ThreadEnv, Option<ObjId>, &[Val]) -> Result<Val, Throw> + Send + Sync>;

/// Creates the payload of a new instance.
pub(crate) type BodyFactory = fn() -> Body;

#[derive(Clone)]
pub(crate) enum MethodBody {
    Abstract,
    Builtin(Builtin),
    /// Bound by `register_natives`; unbound until then.
    Native(Option<NativeFn>),
}

#[derive(Clone)]
pub(crate) struct MethodDef {
    pub name: String,
    pub signature: String,
    pub flags: MethodFlags,
    pub body: MethodBody,
}

impl MethodDef {
    /// Return type part of the signature.
    pub fn return_sig(&self) -> &str {
        self.signature
            .rsplit_once(')')
            .map_or("V", |(_, ret)| ret)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Declaration of a class, handed to [`Jvm::define_class`](crate::Jvm::define_class).
///
/// ```ignore
/// vm.define_class(
///     ClassDef::new("com/example/Data")
///         .field("i", "I")
///         .field("str", "Ljava/lang/String;"),
/// )?;
/// ```
pub struct ClassDef {
    pub(crate) name: String,
    pub(crate) superclass: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) flags: ClassFlags,
    pub(crate) fields: Vec<(String, String)>,
    pub(crate) statics: Vec<(String, String, Val)>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) body: Option<BodyFactory>,
}

impl ClassDef {
    /// A class extending `java/lang/Object` with a no-argument constructor.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let superclass = (name != "java/lang/Object").then(|| "java/lang/Object".to_owned());
        Self {
            name,
            superclass,
            interfaces: Vec::new(),
            flags: ClassFlags::empty(),
            fields: Vec::new(),
            statics: Vec::new(),
            methods: Vec::new(),
            body: None,
        }
        .builtin("<init>", "()V", |_, _, _| Ok(Val::Void))
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.flags |= ClassFlags::ABSTRACT;
        self
    }

    /// Marks the class as an interface. Interfaces have no constructor.
    pub fn interface(mut self) -> Self {
        self.flags |= ClassFlags::INTERFACE | ClassFlags::ABSTRACT;
        self.superclass = None;
        self.methods.retain(|m| m.name != "<init>");
        self
    }

    pub fn field(mut self, name: impl Into<String>, signature: impl Into<String>) -> Self {
        self.fields.push((name.into(), signature.into()));
        self
    }

    pub fn static_field(
        mut self,
        name: impl Into<String>,
        signature: impl Into<String>,
        value: Val,
    ) -> Self {
        self.statics.push((name.into(), signature.into(), value));
        self
    }

    /// Declares an instance method implemented by `register_natives`.
    pub fn native_method(self, name: impl Into<String>, signature: impl Into<String>) -> Self {
        self.method(name, signature, MethodFlags::NATIVE, MethodBody::Native(None))
    }

    /// Declares a static method implemented by `register_natives`.
    pub fn native_static(self, name: impl Into<String>, signature: impl Into<String>) -> Self {
        self.method(
            name,
            signature,
            MethodFlags::NATIVE | MethodFlags::STATIC,
            MethodBody::Native(None),
        )
    }

    pub fn abstract_method(self, name: impl Into<String>, signature: impl Into<String>) -> Self {
        self.method(name, signature, MethodFlags::ABSTRACT, MethodBody::Abstract)
    }

    /// Declares an instance method implemented in Rust.
    pub fn builtin<F>(self, name: impl Into<String>, signature: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ThreadEnv, Option<ObjId>, &[Val]) -> Result<Val, Throw> + Send + Sync + 'static,
    {
        self.method(name, signature, MethodFlags::empty(), MethodBody::Builtin(Arc::new(f)))
    }

    /// Declares a static method implemented in Rust.
    pub fn static_builtin<F>(
        self,
        name: impl Into<String>,
        signature: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(&ThreadEnv, Option<ObjId>, &[Val]) -> Result<Val, Throw> + Send + Sync + 'static,
    {
        self.method(name, signature, MethodFlags::STATIC, MethodBody::Builtin(Arc::new(f)))
    }

    pub(crate) fn body(mut self, factory: BodyFactory) -> Self {
        self.body = Some(factory);
        self
    }

    fn method(
        mut self,
        name: impl Into<String>,
        signature: impl Into<String>,
        flags: MethodFlags,
        body: MethodBody,
    ) -> Self {
        let name = name.into();
        let signature = signature.into();
        // A later declaration replaces an earlier one, e.g. a custom `<init>()V`.
        self.methods
            .retain(|m| !(m.name == name && m.signature == signature));
        self.methods.push(MethodDef {
            name,
            signature,
            flags,
            body,
        });
        self
    }
}

/// A defined class.
pub(crate) struct Class {
    pub name: String,
    pub superclass: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub flags: ClassFlags,
    /// Instance fields including inherited ones, in slot order.
    pub layout: Vec<(String, String)>,
    pub statics: Vec<(String, String)>,
    pub static_values: Vec<Val>,
    pub methods: FxHashMap<u64, MethodDef>,
    pub body: Option<BodyFactory>,
    /// The `java.lang.Class` object standing for this class.
    pub object: ObjId,
}

const STATIC_FIELD_BIT: u64 = 1 << 63;

/// Encodes a field id from the declaring class and slot.
pub(crate) fn field_id(class: ClassId, slot: usize, is_static: bool) -> u64 {
    let raw = ((u64::from(class.0) + 1) << 32) | slot as u64;
    if is_static { raw | STATIC_FIELD_BIT } else { raw }
}

/// Decodes a field id into class, slot and staticness.
pub(crate) fn decode_field_id(raw: u64) -> Option<(ClassId, usize, bool)> {
    let is_static = raw & STATIC_FIELD_BIT != 0;
    let raw = raw & !STATIC_FIELD_BIT;
    let class = (raw >> 32).checked_sub(1)?;
    Some((ClassId(class as u32), (raw & 0xFFFF_FFFF) as usize, is_static))
}

#[derive(Default)]
pub(crate) struct ClassTable {
    classes: Vec<Class>,
    by_name: FxHashMap<String, ClassId>,
}

impl ClassTable {
    pub fn get(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub fn get_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.index()]
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// The id the next defined class will get.
    pub fn next_id(&self) -> ClassId {
        ClassId(self.classes.len() as u32)
    }

    /// Validates `def` and adds it. `object` is the class object allocated
    /// for it.
    pub fn define(&mut self, def: ClassDef, object: ObjId) -> Result<ClassId, VmError> {
        if self.by_name.contains_key(&def.name) {
            return Err(VmError::DuplicateClass(def.name));
        }

        let resolve = |name: &String| {
            self.lookup(name).ok_or_else(|| VmError::UnknownClass {
                class: def.name.clone(),
                missing: name.clone(),
            })
        };
        let superclass = def.superclass.as_ref().map(resolve).transpose()?;
        let interfaces = def
            .interfaces
            .iter()
            .map(resolve)
            .collect::<Result<Vec<_>, _>>()?;

        let mut layout = superclass
            .map(|id| self.get(id).layout.clone())
            .unwrap_or_default();
        for (name, signature) in &def.fields {
            if layout.iter().any(|(n, s)| n == name && s == signature) {
                return Err(VmError::DuplicateMember {
                    class: def.name.clone(),
                    name: name.clone(),
                    signature: signature.clone(),
                });
            }
            layout.push((name.clone(), signature.clone()));
        }

        let body = def.body.or_else(|| superclass.and_then(|id| self.get(id).body));
        let methods = def
            .methods
            .into_iter()
            .map(|m| (member_key(&m.name, &m.signature), m))
            .collect();

        let id = self.next_id();
        self.classes.push(Class {
            name: def.name.clone(),
            superclass,
            interfaces,
            flags: def.flags,
            layout,
            statics: def.statics.iter().map(|(n, s, _)| (n.clone(), s.clone())).collect(),
            static_values: def.statics.into_iter().map(|(_, _, v)| v).collect(),
            methods,
            body,
            object,
        });
        self.by_name.insert(def.name, id);
        Ok(id)
    }

    /// Finds a declared method visible on `class`, for method id lookup.
    pub fn find_method(&self, class: ClassId, key: u64, want_static: bool) -> Option<&MethodDef> {
        let mut pending = vec![class];
        while let Some(id) = pending.pop() {
            let class = self.get(id);
            if let Some(method) = class.methods.get(&key)
                && method.flags.contains(MethodFlags::STATIC) == want_static
            {
                return Some(method);
            }
            pending.extend(class.interfaces.iter().rev().copied());
            pending.extend(class.superclass);
        }
        None
    }

    /// Finds the implementation a virtual call on an instance of `class` runs.
    pub fn dispatch(&self, class: ClassId, key: u64) -> Option<&MethodDef> {
        let mut current = Some(class);
        while let Some(id) = current {
            let class = self.get(id);
            if let Some(method) = class.methods.get(&key)
                && !method.flags.contains(MethodFlags::ABSTRACT)
                && !method.flags.contains(MethodFlags::STATIC)
            {
                return Some(method);
            }
            current = class.superclass;
        }
        None
    }

    /// Slot of instance field `name` with `signature`.
    pub fn find_field(&self, class: ClassId, name: &str, signature: &str) -> Option<usize> {
        self.get(class)
            .layout
            .iter()
            .rposition(|(n, s)| n == name && s == signature)
    }

    /// Declaring class and index of static field `name`.
    pub fn find_static_field(
        &self,
        class: ClassId,
        name: &str,
        signature: &str,
    ) -> Option<(ClassId, usize)> {
        let mut current = Some(class);
        while let Some(id) = current {
            let class = self.get(id);
            if let Some(index) = class
                .statics
                .iter()
                .position(|(n, s)| n == name && s == signature)
            {
                return Some((id, index));
            }
            current = class.superclass;
        }
        None
    }

    /// Whether `class` is `ancestor` or derives from it.
    pub fn is_subclass(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut pending = vec![class];
        while let Some(id) = pending.pop() {
            if id == ancestor {
                return true;
            }
            let class = self.get(id);
            pending.extend(class.interfaces.iter().copied());
            pending.extend(class.superclass);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ClassTable {
        let mut table = ClassTable::default();
        let mut next = 0;
        let mut define = |table: &mut ClassTable, def: ClassDef| {
            next += 1;
            table.define(def, ObjId(next)).unwrap()
        };
        define(&mut table, ClassDef::new("java/lang/Object"));
        define(
            &mut table,
            ClassDef::new("java/util/Sized").interface().abstract_method("size", "()I"),
        );
        define(
            &mut table,
            ClassDef::new("test/Base")
                .implements("java/util/Sized")
                .abstract_class()
                .field("handle", "J"),
        );
        define(
            &mut table,
            ClassDef::new("test/Impl")
                .extends("test/Base")
                .field("count", "I")
                .builtin("size", "()I", |_, _, _| Ok(Val::Int(3))),
        );
        table
    }

    #[test]
    fn member_keys_distinguish_overloads() {
        assert_ne!(member_key("create", "()V"), member_key("create", "(I)V"));
        assert_eq!(member_key("size", "()I"), member_key("size", "()I"));
    }

    #[test]
    fn layouts_extend_superclass_fields() {
        let table = table();
        let implementation = table.lookup("test/Impl").unwrap();
        assert_eq!(table.find_field(implementation, "handle", "J"), Some(0));
        assert_eq!(table.find_field(implementation, "count", "I"), Some(1));
        assert_eq!(table.find_field(implementation, "count", "J"), None);
    }

    #[test]
    fn lookup_sees_interfaces_and_dispatch_finds_implementations() {
        let table = table();
        let sized = table.lookup("java/util/Sized").unwrap();
        let implementation = table.lookup("test/Impl").unwrap();
        let key = member_key("size", "()I");

        let declared = table.find_method(sized, key, false).unwrap();
        assert!(declared.flags.contains(MethodFlags::ABSTRACT));
        assert!(table.find_method(implementation, key, true).is_none());

        let base = table.lookup("test/Base").unwrap();
        assert!(table.dispatch(base, key).is_none());
        assert!(table.dispatch(implementation, key).is_some());
        assert!(table.is_subclass(implementation, sized));
    }

    #[test]
    fn undefined_superclasses_are_rejected() {
        let mut table = table();
        let err = table
            .define(ClassDef::new("test/Orphan").extends("test/Missing"), ObjId(99))
            .err()
            .unwrap();
        assert_eq!(
            err,
            VmError::UnknownClass {
                class: "test/Orphan".into(),
                missing: "test/Missing".into()
            }
        );
    }

    #[test]
    fn field_ids_round_trip() {
        let raw = field_id(ClassId(4), 2, true);
        assert_eq!(decode_field_id(raw), Some((ClassId(4), 2, true)));
        assert_eq!(decode_field_id(field_id(ClassId(0), 0, false)), Some((ClassId(0), 0, false)));
        assert_eq!(decode_field_id(0), None);
    }

    #[test]
    fn counts_parameters() {
        assert_eq!(parameter_count("()V"), Some(0));
        assert_eq!(parameter_count("(I[JLjava/lang/String;)V"), Some(3));
        assert_eq!(parameter_count("([[Ljava/util/List;Z)I"), Some(2));
        assert_eq!(parameter_count("(Ljava/lang/String)V"), None);
        assert_eq!(parameter_count("I"), None);
    }

    #[test]
    fn return_signatures() {
        let def = ClassDef::new("x/Y").native_method("f", "(I[J)Ljava/lang/String;");
        let method = def.methods.iter().find(|m| m.name == "f").unwrap();
        assert_eq!(method.return_sig(), "Ljava/lang/String;");
    }
}
