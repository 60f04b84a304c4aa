use super::ObjectRef;
use crate::jvm::{BinaryName, UnqualifiedName};
use thiserror::Error;

/// Failures while loading, linking, or resolving a symbolic reference
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("class {0} not found")]
    ClassNotFound(BinaryName),

    #[error("{target} is not accessible from {context}")]
    IllegalAccess { target: String, context: BinaryName },

    #[error("no field {name} on {class}")]
    NoSuchField {
        class: BinaryName,
        name: UnqualifiedName,
    },

    #[error("no method {name}{descriptor} on {class}")]
    NoSuchMethod {
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: String,
    },

    #[error("incompatible class change: {0}")]
    IncompatibleClassChange(String),

    #[error("cannot instantiate {0}")]
    Instantiation(BinaryName),

    #[error("malformed class {class}: {message}")]
    Malformed { class: BinaryName, message: String },
}

/// Guest-visible conditions raised by the engine itself
///
/// Each one is materialized as an instance of the matching `java/lang` class before it is
/// dispatched, so guest handlers can catch it like any other throwable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Arithmetic,
    ArrayIndexOutOfBounds,
    ArrayStore,
    ClassCast,
    IllegalMonitorState,
    Interrupted,
    NegativeArraySize,
    NullPointer,
    AbstractMethod,
    IllegalAccess,
    IncompatibleClassChange,
    Instantiation,
    NoClassDefFound,
    NoSuchField,
    NoSuchMethod,
    OutOfMemory,
}

impl Condition {
    pub fn class_name(self) -> BinaryName {
        match self {
            Condition::Arithmetic => BinaryName::ARITHMETICEXCEPTION,
            Condition::ArrayIndexOutOfBounds => BinaryName::ARRAYINDEXOUTOFBOUNDSEXCEPTION,
            Condition::ArrayStore => BinaryName::ARRAYSTOREEXCEPTION,
            Condition::ClassCast => BinaryName::CLASSCASTEXCEPTION,
            Condition::IllegalMonitorState => BinaryName::ILLEGALMONITORSTATEEXCEPTION,
            Condition::Interrupted => BinaryName::INTERRUPTEDEXCEPTION,
            Condition::NegativeArraySize => BinaryName::NEGATIVEARRAYSIZEEXCEPTION,
            Condition::NullPointer => BinaryName::NULLPOINTEREXCEPTION,
            Condition::AbstractMethod => BinaryName::ABSTRACTMETHODERROR,
            Condition::IllegalAccess => BinaryName::ILLEGALACCESSERROR,
            Condition::IncompatibleClassChange => BinaryName::INCOMPATIBLECLASSCHANGEERROR,
            Condition::Instantiation => BinaryName::INSTANTIATIONERROR,
            Condition::NoClassDefFound => BinaryName::NOCLASSDEFFOUNDERROR,
            Condition::NoSuchField => BinaryName::NOSUCHFIELDERROR,
            Condition::NoSuchMethod => BinaryName::NOSUCHMETHODERROR,
            Condition::OutOfMemory => BinaryName::OUTOFMEMORYERROR,
        }
    }
}

/// Abrupt completion of an instruction
#[derive(Debug)]
pub enum Trap {
    /// Guest throwable, already constructed
    Throw(ObjectRef),

    /// Guest condition, constructed by the dispatcher on demand
    Condition(Condition, String),

    /// Broken engine invariant or incomplete native table; never guest catchable
    Fatal(String),

    /// The machine is exiting
    Exit,
}

impl Trap {
    pub fn condition(condition: Condition, message: impl Into<String>) -> Trap {
        Trap::Condition(condition, message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Trap {
        Trap::Fatal(message.into())
    }

    pub fn null_pointer(message: impl Into<String>) -> Trap {
        Trap::Condition(Condition::NullPointer, message.into())
    }
}

impl From<LinkError> for Trap {
    fn from(err: LinkError) -> Trap {
        let condition = match &err {
            LinkError::ClassNotFound(_) => Condition::NoClassDefFound,
            LinkError::IllegalAccess { .. } => Condition::IllegalAccess,
            LinkError::NoSuchField { .. } => Condition::NoSuchField,
            LinkError::NoSuchMethod { .. } => Condition::NoSuchMethod,
            LinkError::IncompatibleClassChange(_) => Condition::IncompatibleClassChange,
            LinkError::Instantiation(_) => Condition::Instantiation,
            LinkError::Malformed { .. } => return Trap::Fatal(err.to_string()),
        };
        Trap::Condition(condition, err.to_string())
    }
}

/// Host-facing errors
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("fatal engine error: {0}")]
    Fatal(String),

    #[error("uncaught guest exception {0}")]
    Uncaught(BinaryName),

    #[error("machine exited with status {0}")]
    Exit(i32),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
