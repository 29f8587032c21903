//! Values stored in fields, slots and containers.

use std::fmt;

use ktbind_core::TypeTag;
use ordered_float::OrderedFloat;

/// Identity of a heap object. Objects are never moved or reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjId(pub(crate) u32);

impl ObjId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A managed value as seen from inside the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Val {
    #[default]
    Void,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Obj(ObjId),
}

impl Val {
    /// Default value of a field or return slot with type `signature`.
    pub fn zero_for(signature: &str) -> Val {
        match TypeTag::of_signature(signature) {
            Some(TypeTag::Boolean) => Val::Boolean(false),
            Some(TypeTag::Byte) => Val::Byte(0),
            Some(TypeTag::Char) => Val::Char(0),
            Some(TypeTag::Short) => Val::Short(0),
            Some(TypeTag::Int) => Val::Int(0),
            Some(TypeTag::Long) => Val::Long(0),
            Some(TypeTag::Float) => Val::Float(0.0),
            Some(TypeTag::Double) => Val::Double(0.0),
            Some(TypeTag::Void) => Val::Void,
            _ => Val::Null,
        }
    }

    pub fn from_ref(obj: Option<ObjId>) -> Val {
        obj.map_or(Val::Null, Val::Obj)
    }

    /// The referenced object, `None` for null and primitives.
    pub fn obj(self) -> Option<ObjId> {
        match self {
            Val::Obj(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_reference(self) -> bool {
        matches!(self, Val::Null | Val::Obj(_))
    }

    pub fn as_int(self) -> Option<i32> {
        match self {
            Val::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_long(self) -> Option<i64> {
        match self {
            Val::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Val::Boolean(v) => Some(v),
            _ => None,
        }
    }
}

/// Equality and ordering of set elements and map keys.
///
/// Strings and boxed primitives compare by value, every other object by
/// identity. The derived order is the natural order used by sorted containers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(OrderedFloat<f32>),
    Double(OrderedFloat<f64>),
    Str(String),
    Identity(ObjId),
}

impl Key {
    pub(crate) fn of_primitive(value: Val) -> Option<Key> {
        Some(match value {
            Val::Boolean(v) => Key::Boolean(v),
            Val::Byte(v) => Key::Byte(v),
            Val::Char(v) => Key::Char(v),
            Val::Short(v) => Key::Short(v),
            Val::Int(v) => Key::Int(v),
            Val::Long(v) => Key::Long(v),
            Val::Float(v) => Key::Float(OrderedFloat(v)),
            Val::Double(v) => Key::Double(OrderedFloat(v)),
            Val::Void | Val::Null | Val::Obj(_) => return None,
        })
    }
}
