//! # Error Model
//!
//! `Error` is the single RPC error type: a `Code` plus the cause that produced
//! it. It is what handlers return, what recovery policies produce, and what
//! clients observe once a `Status` has crossed the wire.

use std::fmt;

use crate::code::Code;

/// A type-erased error, the currency of causes and recovery policies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An RPC error carrying a code and the underlying cause.
///
/// Immutable once constructed.
pub struct Error {
    code: Code,
    cause: BoxError,
}

impl Error {
    pub fn new(code: Code, cause: impl Into<BoxError>) -> Self {
        Self { code, cause: cause.into() }
    }

    /// Adopts an arbitrary boxed error.
    ///
    /// An `Error` inside the box is unwrapped as-is. Anything else is wrapped
    /// with `Code::Unknown`.
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<Error>() {
            Ok(err) => *err,
            Err(other) => Self { code: Code::Unknown, cause: other },
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.cause
    }

    /// The human-readable message, without the code prefix.
    pub fn message(&self) -> String {
        self.cause.to_string()
    }

    /// The wire form of this error.
    pub fn to_status(&self) -> Status {
        Status { code: self.code, message: self.message() }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("code", &self.code)
            .field("cause", &self.cause)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.cause)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.cause)
    }
}

/// Finds the code of an error by walking its `source()` chain.
///
/// Errors that never pass through an `Error` report `Code::Unknown`, so any
/// failure maps to *some* code.
pub fn code_of(err: &(dyn std::error::Error + 'static)) -> Code {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(rpc) = err.downcast_ref::<Error>() {
            return rpc.code;
        }
        current = err.source();
    }
    Code::Unknown
}

/// The serialized shape of an `Error`, as carried by an end-of-stream frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::new(status.code, status.message)
    }
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        err.to_status()
    }
}

/// A specialized Result type for RPC operations.
pub type Result<T> = std::result::Result<T, Error>;
