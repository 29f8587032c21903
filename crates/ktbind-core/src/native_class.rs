//! Handle-object marshaling.
//!
//! A native class lives on the native heap. Its managed counterpart only holds
//! the pointer, in the `nativePointer: Long` field inherited from
//! `NativeObject`. The native object is freed by the bound `close()` method,
//! never by the managed collector. `close()` resets the field to zero, so a
//! second `close()` is a no-op and any other call fails with
//! [`Error::Disposed`] instead of touching freed memory.
//!
//! Access to one handle object is not synchronized. Callers must not use the
//! same instance from several threads at once.

use crate::arg_type::{ArgType, non_null};
use crate::error::{Error, Result};
use crate::refs::{Field, LocalClassRef};
use crate::sys::{JObject, JValue, JniEnv};

/// Name of the managed field holding the native pointer.
pub const NATIVE_POINTER_FIELD: &str = "nativePointer";
const NATIVE_POINTER_SIG: &str = "J";

/// A native type owned through a managed handle. Usually derived with
/// `#[derive(NativeClass)]`.
pub trait NativeClass: ArgType + 'static {
    /// Slash-separated managed class name.
    const CLASS_NAME: &'static str;
    /// Dotted managed class name.
    const QUALIFIED_NAME: &'static str;

    /// Copy used when a handle is passed to a function taking `Self` by value.
    /// Types that cannot be copied reject such calls.
    fn copy_out(&self) -> Option<Self> {
        None
    }
}

fn pointer_field<'e>(env: &'e JniEnv, class_name: &str) -> Result<(LocalClassRef<'e>, Field)> {
    let class = LocalClassRef::find(env, class_name)?;
    let field = class.field(NATIVE_POINTER_FIELD, NATIVE_POINTER_SIG)?;
    Ok((class, field))
}

fn to_raw<T>(ptr: *mut T) -> i64 {
    ptr as usize as i64
}

fn from_raw<T>(raw: i64) -> *mut T {
    raw as usize as *mut T
}

/// Native to boundary: moves `value` to the heap and wraps it in a new handle.
///
/// The native object is allocated first; if creating the managed object fails
/// it is freed again before the error is returned.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn java_value<T: NativeClass>(env: &JniEnv, value: T) -> Result<JValue> {
    let ptr = Box::into_raw(Box::new(value));
    let reclaim = |err: Error| {
        // SAFETY: `ptr` came from `Box::into_raw` above and was never published.
        drop(unsafe { Box::from_raw(ptr) });
        err
    };

    let (class, field) = pointer_field(env, T::CLASS_NAME).map_err(reclaim)?;
    let obj = class.alloc_object().map_err(reclaim)?;
    field
        .set(env, obj.as_obj(), JValue::Long(to_raw(ptr)))
        .map_err(reclaim)?;
    Ok(JValue::Object(obj.into_raw()))
}

/// Resolves the native object behind a handle.
pub fn instance_ptr<T: NativeClass>(env: &JniEnv, obj: JObject) -> Result<*mut T> {
    if obj.is_null() {
        return Err(Error::NullReference(T::QUALIFIED_NAME.to_owned()));
    }
    let (_, field) = pointer_field(env, T::CLASS_NAME)?;
    let raw = field.get(env, obj)?.j()?;
    if raw == 0 {
        return Err(Error::Disposed {
            class: T::QUALIFIED_NAME.to_owned(),
        });
    }
    Ok(from_raw(raw))
}

/// Runs `f` on the native object behind `obj`.
pub fn with_instance<T: NativeClass, R>(
    env: &JniEnv,
    obj: JObject,
    f: impl FnOnce(&T) -> R,
) -> Result<R> {
    let ptr = instance_ptr::<T>(env, obj)?;
    // SAFETY: a non-zero pointer field always holds a live `Box<T>` written by
    // `java_value`; it is only freed by `destroy`, which zeroes the field first.
    Ok(f(unsafe { &*ptr }))
}

/// Runs `f` on the native object behind `obj` with exclusive access.
pub fn with_instance_mut<T: NativeClass, R>(
    env: &JniEnv,
    obj: JObject,
    f: impl FnOnce(&mut T) -> R,
) -> Result<R> {
    let ptr = instance_ptr::<T>(env, obj)?;
    // SAFETY: as in `with_instance`; exclusivity is the caller's obligation.
    Ok(f(unsafe { &mut *ptr }))
}

/// Frees the native object behind `obj` and clears the handle.
///
/// Destroying an already destroyed handle does nothing.
pub fn destroy<T: NativeClass>(env: &JniEnv, obj: JObject) -> Result<()> {
    if obj.is_null() {
        return Err(Error::NullReference(T::QUALIFIED_NAME.to_owned()));
    }
    let (_, field) = pointer_field(env, T::CLASS_NAME)?;
    let raw = field.get(env, obj)?.j()?;
    if raw == 0 {
        return Ok(());
    }
    field.set(env, obj, JValue::Long(0))?;
    // SAFETY: the field held a pointer from `java_value` and is now cleared,
    // so this is the only release of the box.
    drop(unsafe { Box::from_raw(from_raw::<T>(raw)) });
    Ok(())
}

/// Boundary to native by value. Requires the type to opt into copies.
pub fn native_value<T: NativeClass>(env: &JniEnv, value: JValue) -> Result<T> {
    let obj = non_null(value, || T::QUALIFIED_NAME.to_owned())?;
    with_instance::<T, _>(env, obj, |native| native.copy_out())?.ok_or_else(|| {
        Error::Unsupported(format!(
            "native class {} cannot be passed by value",
            T::QUALIFIED_NAME
        ))
    })
}
