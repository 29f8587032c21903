//! Scoped and shared ownership of boundary references.
//!
//! A [`LocalRef`] borrows the environment it was created on, so the borrow
//! checker keeps it from outliving the native call or leaving its thread. It is
//! move-only and deletes its reference exactly once when dropped.
//!
//! A [`GlobalRef`] may be retained past the current call and shared between
//! threads. Clones share one underlying reference; the thread that drops the
//! last clone releases it through its own environment. When that thread cannot
//! obtain an environment the release is skipped: the reference leaks, which is
//! preferred over faulting inside a destructor. Skipped releases are logged and
//! counted, see [`skipped_global_releases`].

use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::env;
use crate::error::{Error, Result, check_pending};
use crate::sys::{FieldId, JClass, JObject, JValue, JniEnv, MethodId};

static SKIPPED_GLOBAL_RELEASES: AtomicUsize = AtomicUsize::new(0);

/// Number of shared references whose release had to be skipped because no
/// environment was available on the releasing thread.
pub fn skipped_global_releases() -> usize {
    SKIPPED_GLOBAL_RELEASES.load(Ordering::Relaxed)
}

/// A local reference deleted when it goes out of scope.
pub struct LocalRef<'env> {
    env: &'env JniEnv,
    obj: JObject,
}

impl<'env> LocalRef<'env> {
    /// Takes ownership of an existing local reference. Null is allowed.
    pub fn new(env: &'env JniEnv, obj: JObject) -> Self {
        Self { env, obj }
    }

    pub fn as_obj(&self) -> JObject {
        self.obj
    }

    pub fn is_null(&self) -> bool {
        self.obj.is_null()
    }

    pub fn env(&self) -> &'env JniEnv {
        self.env
    }

    /// Gives up ownership without deleting the reference.
    pub fn into_raw(self) -> JObject {
        ManuallyDrop::new(self).obj
    }
}

impl Drop for LocalRef<'_> {
    fn drop(&mut self) {
        if !self.obj.is_null() {
            self.env.delete_local_ref(self.obj);
        }
    }
}

impl fmt::Debug for LocalRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalRef").field(&self.obj).finish()
    }
}

/// A scoped reference to a class, with member lookup helpers.
pub struct LocalClassRef<'env> {
    class: LocalRef<'env>,
    name: String,
}

impl<'env> LocalClassRef<'env> {
    /// Looks up a class by its slash-separated name.
    pub fn find(env: &'env JniEnv, name: &str) -> Result<Self> {
        let class = env.find_class(name);
        if class.is_null() {
            return Err(Error::pending_or(env, Error::ClassNotFound(name.to_owned())));
        }
        Ok(Self {
            class: LocalRef::new(env, class),
            name: name.to_owned(),
        })
    }

    /// Like [`find`](Self::find), but a missing class clears the pending
    /// exception and yields `None`.
    pub fn find_optional(env: &'env JniEnv, name: &str) -> Option<Self> {
        let class = env.find_class(name);
        if class.is_null() {
            env.exception_clear();
            return None;
        }
        Some(Self {
            class: LocalRef::new(env, class),
            name: name.to_owned(),
        })
    }

    /// The runtime class of `obj`.
    pub fn of_object(env: &'env JniEnv, obj: JObject) -> Result<Self> {
        if obj.is_null() {
            return Err(Error::NullReference("an object".into()));
        }
        let class = env.get_object_class(obj);
        if class.is_null() {
            return Err(Error::pending_or(env, Error::ClassNotFound("<object class>".into())));
        }
        Ok(Self {
            class: LocalRef::new(env, class),
            name: "<object class>".into(),
        })
    }

    pub fn as_obj(&self) -> JClass {
        self.class.as_obj()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &'env JniEnv {
        self.class.env()
    }

    pub fn method(&self, name: &str, signature: &str) -> Result<Method> {
        let env = self.env();
        env.get_method_id(self.as_obj(), name, signature)
            .map(Method)
            .ok_or_else(|| Error::pending_or(env, self.method_not_found(name, signature)))
    }

    pub fn static_method(&self, name: &str, signature: &str) -> Result<StaticMethod> {
        let env = self.env();
        env.get_static_method_id(self.as_obj(), name, signature)
            .map(StaticMethod)
            .ok_or_else(|| Error::pending_or(env, self.method_not_found(name, signature)))
    }

    pub fn field(&self, name: &str, signature: &str) -> Result<Field> {
        let env = self.env();
        env.get_field_id(self.as_obj(), name, signature)
            .map(Field)
            .ok_or_else(|| Error::pending_or(env, self.field_not_found(name, signature)))
    }

    pub fn static_field(&self, name: &str, signature: &str) -> Result<StaticField> {
        let env = self.env();
        env.get_static_field_id(self.as_obj(), name, signature)
            .map(StaticField)
            .ok_or_else(|| Error::pending_or(env, self.field_not_found(name, signature)))
    }

    /// Reads an object-typed static field into a scoped reference.
    pub fn static_object_field(&self, name: &str, signature: &str) -> Result<LocalRef<'env>> {
        let field = self.static_field(name, signature)?;
        let value = field.get(self.env(), self.as_obj())?.l()?;
        Ok(LocalRef::new(self.env(), value))
    }

    /// Allocates an instance without running a constructor.
    pub fn alloc_object(&self) -> Result<LocalRef<'env>> {
        let env = self.env();
        let obj = env.alloc_object(self.as_obj());
        if obj.is_null() {
            return Err(Error::pending_or(
                env,
                Error::Conversion(format!("cannot allocate an instance of '{}'", self.name)),
            ));
        }
        Ok(LocalRef::new(env, obj))
    }

    /// Runs the constructor with signature `signature` on a new instance.
    pub fn new_object(&self, signature: &str, args: &[JValue]) -> Result<LocalRef<'env>> {
        let env = self.env();
        let ctor = self.method("<init>", signature)?;
        let obj = env.new_object(self.as_obj(), ctor.id(), args);
        if obj.is_null() {
            return Err(Error::pending_or(
                env,
                Error::Conversion(format!("cannot construct an instance of '{}'", self.name)),
            ));
        }
        Ok(LocalRef::new(env, obj))
    }

    fn method_not_found(&self, name: &str, signature: &str) -> Error {
        Error::MethodNotFound {
            class: self.name.clone(),
            name: name.to_owned(),
            signature: signature.to_owned(),
        }
    }

    fn field_not_found(&self, name: &str, signature: &str) -> Error {
        Error::FieldNotFound {
            class: self.name.clone(),
            name: name.to_owned(),
            signature: signature.to_owned(),
        }
    }
}

/// A resolved instance method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method(MethodId);

impl Method {
    pub fn id(self) -> MethodId {
        self.0
    }

    /// Calls the method, turning a raised exception into [`Error::Java`].
    pub fn call(self, env: &JniEnv, obj: JObject, args: &[JValue]) -> Result<JValue> {
        let value = env.call_method(obj, self.0, args);
        check_pending(env)?;
        Ok(value)
    }
}

/// A resolved static method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticMethod(MethodId);

impl StaticMethod {
    pub fn id(self) -> MethodId {
        self.0
    }

    pub fn call(self, env: &JniEnv, class: JClass, args: &[JValue]) -> Result<JValue> {
        let value = env.call_static_method(class, self.0, args);
        check_pending(env)?;
        Ok(value)
    }
}

/// A resolved instance field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field(FieldId);

impl Field {
    pub fn id(self) -> FieldId {
        self.0
    }

    pub fn get(self, env: &JniEnv, obj: JObject) -> Result<JValue> {
        let value = env.get_field(obj, self.0);
        check_pending(env)?;
        Ok(value)
    }

    pub fn set(self, env: &JniEnv, obj: JObject, value: JValue) -> Result<()> {
        env.set_field(obj, self.0, value);
        check_pending(env)
    }
}

/// A resolved static field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticField(FieldId);

impl StaticField {
    pub fn id(self) -> FieldId {
        self.0
    }

    pub fn get(self, env: &JniEnv, class: JClass) -> Result<JValue> {
        let value = env.get_static_field(class, self.0);
        check_pending(env)?;
        Ok(value)
    }
}

/// A reference that remains valid across calls and threads.
#[derive(Clone)]
pub struct GlobalRef {
    inner: Arc<GlobalInner>,
}

struct GlobalInner {
    obj: JObject,
}

impl GlobalRef {
    /// Creates a new global reference to `obj`. The caller keeps its own reference.
    pub fn new(env: &JniEnv, obj: JObject) -> Self {
        let obj = if obj.is_null() {
            JObject::NULL
        } else {
            env.new_global_ref(obj)
        };
        Self {
            inner: Arc::new(GlobalInner { obj }),
        }
    }

    pub fn as_obj(&self) -> JObject {
        self.inner.obj
    }

    pub fn is_null(&self) -> bool {
        self.inner.obj.is_null()
    }
}

impl fmt::Debug for GlobalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobalRef").field(&self.inner.obj).finish()
    }
}

impl Drop for GlobalInner {
    fn drop(&mut self) {
        if self.obj.is_null() {
            return;
        }
        match env::this_thread() {
            Some(env) => env.delete_global_ref(self.obj),
            None => {
                SKIPPED_GLOBAL_RELEASES.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "no environment on this thread; leaking global reference {:?}",
                    self.obj
                );
            }
        }
    }
}
