//! Error types for marshaling, calls and registration.
//!
//! ## Propagation
//!
//! ```text
//! Error               - native-local failures, translated by trampolines
//! ├── lookup          - ClassNotFound / MethodNotFound / FieldNotFound
//! ├── Disposed        - call through a handle whose native object was destroyed
//! ├── Unsupported     - conversions that cannot be expressed across the boundary
//! ├── Java            - an exception raised on the managed side, kept verbatim
//! └── marshaling      - NullReference / TypeMismatch / ArgumentCount / Conversion
//! RegistrationError   - fatal load-time failures, reported as a status code
//! ```
//!
//! Every trampoline is the last line of defense towards the runtime: it turns an
//! [`Error`] into a pending managed exception. Every callback invocation is the
//! last line of defense in the other direction: it turns a pending managed
//! exception into [`Error::Java`].

use std::fmt;

use thiserror::Error;

use crate::refs::{GlobalRef, LocalClassRef, LocalRef};
use crate::signature::TypeTag;
use crate::sys::{JNI_ERR, JObject, JValue, JniEnv, JniStatus};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while marshaling values or invoking bound functions.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find class '{0}'")]
    ClassNotFound(String),

    #[error("cannot find method '{name}' with signature '{signature}' in class '{class}'")]
    MethodNotFound {
        class: String,
        name: String,
        signature: String,
    },

    #[error("cannot find field '{name}' with type signature '{signature}' in class '{class}'")]
    FieldNotFound {
        class: String,
        name: String,
        signature: String,
    },

    /// The native object behind a handle has already been destroyed.
    #[error("object {class} has already been disposed of")]
    Disposed { class: String },

    #[error("{0}")]
    Unsupported(String),

    /// An exception raised by managed code.
    #[error(transparent)]
    Java(#[from] JavaException),

    #[error("unexpected null reference where {0} was expected")]
    NullReference(String),

    #[error("expected a value of kind {expected}, got {actual}")]
    TypeMismatch { expected: TypeTag, actual: TypeTag },

    #[error("expected {expected} argument(s), got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("no runtime environment is available on the current thread")]
    EnvironmentUnavailable,

    /// A failure reported by user code.
    #[error("{0}")]
    Native(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Captures the exception pending on `env`, or returns `fallback` when none is.
    pub fn pending_or(env: &JniEnv, fallback: Error) -> Error {
        match JavaException::from_pending(env) {
            Some(ex) => Error::Java(ex),
            None => fallback,
        }
    }

    pub fn native(message: impl Into<String>) -> Self {
        Error::Native(message.into())
    }

    pub(crate) fn mismatch(expected: TypeTag, actual: &JValue) -> Self {
        Error::TypeMismatch {
            expected,
            actual: actual.tag(),
        }
    }
}

/// Fails with the exception pending on `env`, if any.
pub fn check_pending(env: &JniEnv) -> Result<()> {
    match JavaException::from_pending(env) {
        Some(ex) => Err(Error::Java(ex)),
        None => Ok(()),
    }
}

/// An exception that originated in managed code.
///
/// Capturing clears the pending state so further boundary calls are legal.
/// The original throwable is kept alive through a [`GlobalRef`] so that it can
/// be re-thrown unchanged if native code does not handle it.
#[derive(Clone, Error)]
#[error("{message}")]
pub struct JavaException {
    throwable: GlobalRef,
    message: String,
}

impl JavaException {
    /// Takes the pending exception off `env`. Returns `None` when nothing is pending.
    pub fn from_pending(env: &JniEnv) -> Option<Self> {
        if !env.exception_check() {
            return None;
        }

        let throwable = LocalRef::new(env, env.exception_occurred());
        env.exception_clear();

        let message = message_of(env, throwable.as_obj());
        Some(Self {
            throwable: GlobalRef::new(env, throwable.as_obj()),
            message,
        })
    }

    /// Text returned by the throwable's `getMessage()`, empty if it had none.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn throwable(&self) -> &GlobalRef {
        &self.throwable
    }

    /// Makes the original throwable pending again on `env`.
    pub fn rethrow(&self, env: &JniEnv) -> JniStatus {
        env.throw(self.throwable.as_obj())
    }
}

impl fmt::Debug for JavaException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JavaException")
            .field("throwable", &self.throwable.as_obj())
            .field("message", &self.message)
            .finish()
    }
}

fn message_of(env: &JniEnv, throwable: JObject) -> String {
    let Ok(class) = LocalClassRef::of_object(env, throwable) else {
        env.exception_clear();
        return String::new();
    };
    let Some(get_message) = env.get_method_id(class.as_obj(), "getMessage", "()Ljava/lang/String;")
    else {
        env.exception_clear();
        return String::new();
    };

    let message = env.call_method(throwable, get_message, &[]);
    if env.exception_check() {
        env.exception_clear();
        return String::new();
    }

    match message {
        JValue::Object(text) if !text.is_null() => {
            let text = LocalRef::new(env, text);
            env.get_string_utf_chars(text.as_obj()).unwrap_or_default()
        }
        _ => String::new(),
    }
}

/// Fatal failures of the load-time registration sequence.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("cannot obtain an environment for the loading thread: {0}")]
    Environment(JniStatus),

    #[error("Cannot find class '{0}' registered as a native class")]
    NativeClassNotFound(String),

    #[error("Cannot find class '{0}' registered as a data class")]
    DataClassNotFound(String),

    #[error("Cannot find field '{name}' with type signature '{signature}' in registered class '{class}'")]
    FieldNotFound {
        class: String,
        name: String,
        signature: String,
    },

    #[error("registering native methods of class '{class}' failed with status {status}")]
    RegisterNatives { class: String, status: JniStatus },

    #[error("an exception is pending after registering native methods")]
    PendingException,

    #[error("registration panicked: {0}")]
    Panic(String),
}

impl RegistrationError {
    /// Status code reported back to the runtime.
    pub fn status(&self) -> i32 {
        match self {
            RegistrationError::Environment(status) => (*status).into(),
            RegistrationError::RegisterNatives { status, .. } => (*status).into(),
            _ => JNI_ERR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposed_message_names_class() {
        let err = Error::Disposed {
            class: "com.kheiron.ktbind.Sample".into(),
        };
        assert_eq!(
            err.to_string(),
            "object com.kheiron.ktbind.Sample has already been disposed of"
        );
    }

    #[test]
    fn mismatch_uses_signature_chars() {
        let err = Error::mismatch(TypeTag::Int, &JValue::Boolean(true));
        assert_eq!(err.to_string(), "expected a value of kind I, got Z");
    }

    #[test]
    fn anyhow_errors_convert() {
        let err: Error = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn registration_status_codes() {
        let err = RegistrationError::RegisterNatives {
            class: "a/B".into(),
            status: JniStatus::Detached,
        };
        assert_eq!(err.status(), -2);
        assert_eq!(RegistrationError::PendingException.status(), JNI_ERR);
        assert_eq!(
            RegistrationError::FieldNotFound {
                class: "a/B".into(),
                name: "x".into(),
                signature: "I".into(),
            }
            .to_string(),
            "Cannot find field 'x' with type signature 'I' in registered class 'a/B'"
        );
    }
}
