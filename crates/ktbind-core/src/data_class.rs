//! Value-object marshaling.
//!
//! A data class crosses the boundary by copy. Native to boundary allocates the
//! managed class without running its constructor and writes every registered
//! field; boundary to native starts from `T::default()` and reads every
//! registered field back. The two sides share no identity.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::arg_type::{ArgType, non_null};
use crate::bindings::{self, FieldBinding};
use crate::error::{Error, Result};
use crate::refs::{LocalClassRef, LocalRef};
use crate::sys::{JValue, JniEnv};

/// A native type marshaled field by field. Usually derived with
/// `#[derive(DataClass)]`.
pub trait DataClass: ArgType + Default + 'static {
    /// Slash-separated managed class name, e.g. `com/example/Data`.
    const CLASS_NAME: &'static str;
    /// Dotted managed class name, e.g. `com.example.Data`.
    const QUALIFIED_NAME: &'static str;
}

type ReadFn<T> = dyn Fn(&JniEnv, JValue, &mut T) -> Result<()> + Send + Sync;
type WriteFn<T> = dyn Fn(&JniEnv, &T) -> Result<JValue> + Send + Sync;

/// Typed accessor pair for one field, stored erased in the registry.
struct FieldAccessor<T> {
    read: Box<ReadFn<T>>,
    write: Box<WriteFn<T>>,
}

/// Registers the fields of a data class.
pub struct DataClassBuilder<T> {
    _marker: PhantomData<fn() -> T>,
}

/// Starts registering fields of `T`.
pub fn data_class<T: DataClass>() -> DataClassBuilder<T> {
    DataClassBuilder {
        _marker: PhantomData,
    }
}

impl<T: DataClass> DataClassBuilder<T> {
    /// Binds the managed field `name` to the native member reached by `get`
    /// and `get_mut`.
    ///
    /// ```ignore
    /// data_class::<Data>()
    ///     .field("i", |d| &d.i, |d| &mut d.i)
    ///     .field("str", |d| &d.str, |d| &mut d.str);
    /// ```
    pub fn field<F, G, M>(self, name: &str, get: G, get_mut: M) -> Self
    where
        F: ArgType + Clone + 'static,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        let accessor = FieldAccessor::<T> {
            read: Box::new(move |env: &JniEnv, value: JValue, target: &mut T| {
                *get_mut(target) = F::native_value(env, value)?;
                Ok(())
            }),
            write: Box::new(move |env: &JniEnv, source: &T| {
                F::java_value(env, get(source).clone())
            }),
        };

        bindings::register_field(
            &T::type_sig(),
            T::CLASS_NAME,
            T::QUALIFIED_NAME,
            FieldBinding {
                name: name.to_owned(),
                signature: F::type_sig().into_owned(),
                kotlin_type: F::kotlin_type().into_owned(),
                accessor: Arc::new(accessor),
            },
        );
        self
    }
}

fn accessor<T: 'static>(field: &FieldBinding) -> Result<&FieldAccessor<T>> {
    field.accessor.downcast_ref::<FieldAccessor<T>>().ok_or_else(|| {
        Error::Conversion(format!("field '{}' is bound to a different type", field.name))
    })
}

fn registered_fields<T: DataClass>() -> Arc<Vec<FieldBinding>> {
    bindings::data_class_fields(&T::type_sig()).unwrap_or_else(|| {
        log::debug!("data class {} has no registered fields", T::QUALIFIED_NAME);
        Arc::new(Vec::new())
    })
}

/// Boundary to native for a data class.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn native_value<T: DataClass>(env: &JniEnv, value: JValue) -> Result<T> {
    let obj = non_null(value, || T::QUALIFIED_NAME.to_owned())?;
    let class = LocalClassRef::find(env, T::CLASS_NAME)?;

    let mut native = T::default();
    for field in registered_fields::<T>().iter() {
        let id = class.field(&field.name, &field.signature)?;
        let value = id.get(env, obj)?;
        let scoped = value.as_object().map(|o| LocalRef::new(env, o));
        (accessor::<T>(field)?.read)(env, value, &mut native)?;
        drop(scoped);
    }
    Ok(native)
}

/// Native to boundary for a data class.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn java_value<T: DataClass>(env: &JniEnv, value: T) -> Result<JValue> {
    let class = LocalClassRef::find(env, T::CLASS_NAME)?;
    let obj = class.alloc_object()?;

    for field in registered_fields::<T>().iter() {
        let id = class.field(&field.name, &field.signature)?;
        let field_value = (accessor::<T>(field)?.write)(env, &value)?;
        let scoped = field_value.as_object().map(|o| LocalRef::new(env, o));
        id.set(env, obj.as_obj(), field_value)?;
        drop(scoped);
    }
    Ok(JValue::Object(obj.into_raw()))
}
