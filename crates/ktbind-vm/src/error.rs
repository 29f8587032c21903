//! Errors raised by the reference runtime.

use thiserror::Error;

use crate::value::ObjId;

/// Failures while defining classes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("class '{0}' is already defined")]
    DuplicateClass(String),

    #[error("class '{class}' refers to undefined class '{missing}'")]
    UnknownClass { class: String, missing: String },

    #[error("class '{class}' declares member '{name}{signature}' twice")]
    DuplicateMember {
        class: String,
        name: String,
        signature: String,
    },
}

/// An exception in flight inside the runtime.
///
/// Runtime methods return it to unwind a managed call; the runtime turns it
/// into a throwable object when it becomes pending or reaches the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Throw {
    /// Instantiate `class` with `message`.
    New {
        class: String,
        message: Option<String>,
    },
    /// Throw an existing throwable.
    Object(ObjId),
}

impl Throw {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Throw::New {
            class: class.into(),
            message: Some(message.into()),
        }
    }

    pub(crate) fn npe(what: &str) -> Self {
        Throw::new("java/lang/NullPointerException", what)
    }

    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        Throw::new("java/lang/IllegalStateException", message)
    }
}

/// A managed exception that escaped a call made from the test side.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{class}: {}", message.as_deref().unwrap_or("<no message>"))]
pub struct Thrown {
    /// Slash-separated class name of the throwable.
    pub class: String,
    pub message: Option<String>,
    /// The throwable itself.
    pub object: ObjId,
}
