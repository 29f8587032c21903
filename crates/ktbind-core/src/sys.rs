//! Boundary ABI consumed by the binding engine.
//!
//! The managed runtime is reachable only through opaque handles and the
//! [`NativeInterface`] table of a per-thread environment. Everything in this
//! module mirrors that surface and carries no marshaling logic of its own.
//!
//! # Handles
//!
//! Object, class, string and throwable handles are all [`JObject`] values; the
//! aliases exist to document intent at call sites. A handle is either a *local*
//! reference (valid on the creating thread until deleted or until the native
//! call that created it returns) or a *global* reference (valid on any thread
//! until deleted).
//!
//! # Environments
//!
//! An [`Env`] is thread-affine: it is reference counted with [`Rc`] and cannot
//! leave the thread it was obtained on. A [`JavaVm`] is the process-wide handle
//! from which each thread obtains its own environment.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Interface version requested from the runtime.
pub const JNI_VERSION_1_6: i32 = 0x0001_0006;

pub const JNI_OK: i32 = JniStatus::Ok as i32;
pub const JNI_ERR: i32 = JniStatus::Err as i32;
pub const JNI_EDETACHED: i32 = JniStatus::Detached as i32;
pub const JNI_EVERSION: i32 = JniStatus::Version as i32;

/// Status codes returned by runtime operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum JniStatus {
    Ok = 0,
    Err = -1,
    /// The calling thread is not attached to the runtime.
    Detached = -2,
    /// The requested interface version is not supported.
    Version = -3,
}

impl JniStatus {
    pub fn is_ok(self) -> bool {
        self == JniStatus::Ok
    }
}

impl fmt::Display for JniStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code: i32 = (*self).into();
        write!(f, "{:?} ({})", self, code)
    }
}

/// Opaque reference to a managed object. The raw value `0` is the null reference.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct JObject(u64);

pub type JClass = JObject;
pub type JString = JObject;
pub type JThrowable = JObject;
pub type JArray = JObject;

impl JObject {
    pub const NULL: JObject = JObject(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for JObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("JObject(null)")
        } else {
            write!(f, "JObject({:#x})", self.0)
        }
    }
}

/// Resolved instance or static method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MethodId(u64);

impl MethodId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

/// Resolved instance or static field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct FieldId(u64);

impl FieldId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

/// A value crossing the boundary: a primitive or an object handle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum JValue {
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
    Object(JObject),
}

impl JValue {
    /// The signature character describing this value.
    pub fn tag(&self) -> crate::TypeTag {
        use crate::TypeTag;
        match self {
            JValue::Void => TypeTag::Void,
            JValue::Boolean(_) => TypeTag::Boolean,
            JValue::Byte(_) => TypeTag::Byte,
            JValue::Char(_) => TypeTag::Char,
            JValue::Short(_) => TypeTag::Short,
            JValue::Int(_) => TypeTag::Int,
            JValue::Long(_) => TypeTag::Long,
            JValue::Float(_) => TypeTag::Float,
            JValue::Double(_) => TypeTag::Double,
            JValue::Object(_) => TypeTag::Object,
        }
    }

    /// The object handle carried by this value, if any.
    pub fn as_object(&self) -> Option<JObject> {
        match self {
            JValue::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    pub fn z(self) -> crate::Result<bool> {
        match self {
            JValue::Boolean(v) => Ok(v),
            other => Err(crate::Error::mismatch(crate::TypeTag::Boolean, &other)),
        }
    }

    pub fn i(self) -> crate::Result<i32> {
        match self {
            JValue::Int(v) => Ok(v),
            other => Err(crate::Error::mismatch(crate::TypeTag::Int, &other)),
        }
    }

    pub fn j(self) -> crate::Result<i64> {
        match self {
            JValue::Long(v) => Ok(v),
            other => Err(crate::Error::mismatch(crate::TypeTag::Long, &other)),
        }
    }

    pub fn l(self) -> crate::Result<JObject> {
        match self {
            JValue::Object(v) => Ok(v),
            other => Err(crate::Error::mismatch(crate::TypeTag::Object, &other)),
        }
    }
}

impl From<JObject> for JValue {
    fn from(value: JObject) -> Self {
        JValue::Object(value)
    }
}

/// Element kind of a primitive array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

/// Source buffer for a bulk copy into a primitive array.
#[derive(Debug, Clone, Copy)]
pub enum Region<'a> {
    Boolean(&'a [bool]),
    Byte(&'a [i8]),
    Char(&'a [u16]),
    Short(&'a [i16]),
    Int(&'a [i32]),
    Long(&'a [i64]),
    Float(&'a [f32]),
    Double(&'a [f64]),
}

/// Destination buffer for a bulk copy out of a primitive array.
#[derive(Debug)]
pub enum RegionMut<'a> {
    Boolean(&'a mut [bool]),
    Byte(&'a mut [i8]),
    Char(&'a mut [u16]),
    Short(&'a mut [i16]),
    Int(&'a mut [i32]),
    Long(&'a mut [i64]),
    Float(&'a mut [f32]),
    Double(&'a mut [f64]),
}

impl Region<'_> {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Region::Boolean(_) => PrimitiveKind::Boolean,
            Region::Byte(_) => PrimitiveKind::Byte,
            Region::Char(_) => PrimitiveKind::Char,
            Region::Short(_) => PrimitiveKind::Short,
            Region::Int(_) => PrimitiveKind::Int,
            Region::Long(_) => PrimitiveKind::Long,
            Region::Float(_) => PrimitiveKind::Float,
            Region::Double(_) => PrimitiveKind::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Region::Boolean(s) => s.len(),
            Region::Byte(s) => s.len(),
            Region::Char(s) => s.len(),
            Region::Short(s) => s.len(),
            Region::Int(s) => s.len(),
            Region::Long(s) => s.len(),
            Region::Float(s) => s.len(),
            Region::Double(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RegionMut<'_> {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            RegionMut::Boolean(_) => PrimitiveKind::Boolean,
            RegionMut::Byte(_) => PrimitiveKind::Byte,
            RegionMut::Char(_) => PrimitiveKind::Char,
            RegionMut::Short(_) => PrimitiveKind::Short,
            RegionMut::Int(_) => PrimitiveKind::Int,
            RegionMut::Long(_) => PrimitiveKind::Long,
            RegionMut::Float(_) => PrimitiveKind::Float,
            RegionMut::Double(_) => PrimitiveKind::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RegionMut::Boolean(s) => s.len(),
            RegionMut::Byte(s) => s.len(),
            RegionMut::Char(s) => s.len(),
            RegionMut::Short(s) => s.len(),
            RegionMut::Int(s) => s.len(),
            RegionMut::Long(s) => s.len(),
            RegionMut::Float(s) => s.len(),
            RegionMut::Double(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Function table of a per-thread runtime environment.
///
/// Operations follow the runtime's conventions rather than Rust's: a failed
/// lookup or call returns a null handle, `None` or [`JValue::Void`] and leaves
/// an exception pending on the environment. Callers inspect
/// [`exception_check`](NativeInterface::exception_check) to tell the two apart.
pub trait NativeInterface {
    fn version(&self) -> i32;

    // Reflection

    fn find_class(&self, name: &str) -> JClass;
    fn get_object_class(&self, obj: JObject) -> JClass;
    fn get_method_id(&self, class: JClass, name: &str, sig: &str) -> Option<MethodId>;
    fn get_static_method_id(&self, class: JClass, name: &str, sig: &str) -> Option<MethodId>;
    fn get_field_id(&self, class: JClass, name: &str, sig: &str) -> Option<FieldId>;
    fn get_static_field_id(&self, class: JClass, name: &str, sig: &str) -> Option<FieldId>;

    // Objects

    /// Allocates an instance without running any constructor.
    fn alloc_object(&self, class: JClass) -> JObject;
    fn new_object(&self, class: JClass, ctor: MethodId, args: &[JValue]) -> JObject;
    fn call_method(&self, obj: JObject, method: MethodId, args: &[JValue]) -> JValue;
    fn call_static_method(&self, class: JClass, method: MethodId, args: &[JValue]) -> JValue;
    fn get_field(&self, obj: JObject, field: FieldId) -> JValue;
    fn set_field(&self, obj: JObject, field: FieldId, value: JValue);
    fn get_static_field(&self, class: JClass, field: FieldId) -> JValue;
    fn is_same_object(&self, a: JObject, b: JObject) -> bool;

    // Strings and arrays

    fn new_string_utf(&self, value: &str) -> JString;
    fn get_string_utf_chars(&self, string: JString) -> Option<String>;
    fn get_array_length(&self, array: JArray) -> i32;
    fn new_primitive_array(&self, kind: PrimitiveKind, len: i32) -> JArray;
    fn get_array_region(&self, array: JArray, start: i32, buf: RegionMut<'_>);
    fn set_array_region(&self, array: JArray, start: i32, buf: Region<'_>);

    // Exceptions

    fn exception_check(&self) -> bool;
    /// Returns a new local reference to the pending exception, or null.
    fn exception_occurred(&self) -> JThrowable;
    fn exception_clear(&self);
    fn throw(&self, throwable: JThrowable) -> JniStatus;
    fn throw_new(&self, class: JClass, message: &str) -> JniStatus;

    // References

    fn new_local_ref(&self, obj: JObject) -> JObject;
    fn delete_local_ref(&self, obj: JObject);
    fn new_global_ref(&self, obj: JObject) -> JObject;
    fn delete_global_ref(&self, obj: JObject);

    // Registration

    fn register_natives(&self, class: JClass, methods: &[NativeMethod]) -> JniStatus;
}

/// The environment table as seen by native code during a call.
pub type JniEnv = dyn NativeInterface;

/// Owned, thread-affine handle to an environment.
pub type Env = Rc<dyn NativeInterface>;

/// Process-wide runtime handle.
pub trait JavaVm: Send + Sync {
    /// Returns the environment of the calling thread if it is attached.
    fn get_env(&self, version: i32) -> Result<Env, JniStatus>;
    fn attach_current_thread(&self) -> Result<Env, JniStatus>;
    fn detach_current_thread(&self) -> JniStatus;
}

/// Trait for native entry points installed into the runtime.
///
/// `this` is the receiver for instance methods and the class for static ones.
pub trait NativeCallable {
    fn call(&self, env: &JniEnv, this: JObject, args: &[JValue]) -> JValue;
}

impl<F> NativeCallable for F
where
    F: Fn(&JniEnv, JObject, &[JValue]) -> JValue,
{
    fn call(&self, env: &JniEnv, this: JObject, args: &[JValue]) -> JValue {
        (self)(env, this, args)
    }
}

/// Type-erased native entry point.
///
/// The callable is shared so one entry can be handed to the runtime while the
/// binding registry keeps its own copy.
pub struct NativeFn {
    inner: Arc<dyn NativeCallable + Send + Sync>,
}

impl NativeFn {
    pub fn new<F>(f: F) -> Self
    where
        F: NativeCallable + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    pub fn call(&self, env: &JniEnv, this: JObject, args: &[JValue]) -> JValue {
        self.inner.call(env, this, args)
    }
}

impl Clone for NativeFn {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").finish_non_exhaustive()
    }
}

/// One entry of a bulk [`register_natives`](NativeInterface::register_natives) call.
#[derive(Debug, Clone)]
pub struct NativeMethod {
    pub name: String,
    pub signature: String,
    pub entry: NativeFn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_runtime_values() {
        assert_eq!(JNI_OK, 0);
        assert_eq!(JNI_ERR, -1);
        assert_eq!(JNI_EDETACHED, -2);
        assert_eq!(JNI_EVERSION, -3);
        assert_eq!(JniStatus::try_from(-2), Ok(JniStatus::Detached));
        assert!(JniStatus::try_from(7).is_err());
    }

    #[test]
    fn null_handle() {
        assert!(JObject::NULL.is_null());
        assert!(JObject::default().is_null());
        assert!(!JObject::from_raw(5).is_null());
        assert_eq!(JObject::from_raw(5).as_raw(), 5);
    }

    #[test]
    fn native_fn_debug_is_opaque() {
        let entry = NativeFn::new(|_: &JniEnv, _: JObject, args: &[JValue]| {
            JValue::Int(args.len() as i32)
        });
        let copy = entry.clone();
        assert_eq!(format!("{:?}", copy), "NativeFn { .. }");
    }

    #[test]
    fn value_tags() {
        assert_eq!(JValue::Int(3).tag(), crate::TypeTag::Int);
        assert_eq!(JValue::from(JObject::NULL).as_object(), Some(JObject::NULL));
        assert_eq!(JValue::Long(1).as_object(), None);
    }

    #[test]
    fn region_reports_kind_and_len() {
        let data = [1i32, 2, 3];
        let region = Region::Int(&data);
        assert_eq!(region.kind(), PrimitiveKind::Int);
        assert_eq!(region.len(), 3);

        let mut out = [0.0f64; 2];
        let region = RegionMut::Double(&mut out);
        assert_eq!(region.kind(), PrimitiveKind::Double);
        assert!(!region.is_empty());
    }
}
