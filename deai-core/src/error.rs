use std::rc::Rc;

use crate::object::ObjectRef;
use crate::variant::{Type, Variant};

/// The error taxonomy recognized by the runtime.
#[derive(Debug, thiserror::Error)]
pub enum DiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("cannot convert {from:?} to {to:?}")]
    InvalidType { from: Type, to: Type },

    #[error("integer conversion out of range")]
    OutOfRange,

    #[error("wrong number of arguments: expected {expected}, got {got}")]
    InvalidArity { expected: usize, got: usize },

    #[error("object has no call handler")]
    NotCallable,

    #[error("too many arguments or captures")]
    TooLarge,

    #[error("member already exists: {0}")]
    Exists(String),

    #[error("member is read-only: {0}")]
    Readonly(String),

    #[error("lost connection")]
    LostConnection,

    #[error("collaborator shut down")]
    Shutdown,

    #[error("{message}")]
    Other {
        message: String,
        location: Option<String>,
    },
}

impl DiError {
    #[track_caller]
    pub fn other(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        DiError::Other {
            message: message.into(),
            location: Some(format!("{}:{}", loc.file(), loc.line())),
        }
    }

    /// Wraps this error as a first-class `deai:error` object: a plain
    /// object carrying an `errmsg` member, so it can be thrown, returned
    /// as a `Variant::Object`, or stored like any other value.
    pub fn into_object(self) -> ObjectRef {
        let obj = ObjectRef::new();
        obj.set_type("deai:error");
        let _ = obj.add_member("errmsg", Variant::String(Rc::from(self.to_string())), false);
        obj
    }

    /// Recovers the `errmsg` member from an object produced by
    /// [`DiError::into_object`], for code that receives one back as a
    /// `Variant::Object` and needs to treat it as an error again.
    pub fn from_object(obj: &ObjectRef) -> Option<DiError> {
        match obj.get_member("errmsg")? {
            Variant::String(s) => Some(DiError::other(s.to_string())),
            Variant::StringLiteral(s) => Some(DiError::other(s)),
            _ => None,
        }
    }
}
