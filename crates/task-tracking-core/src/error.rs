//! The typed error taxonomy consumed by callers (`spec.md` §7).
//!
//! Every fallible core operation returns [`Error`], which is tagged by
//! [`ErrorKind`] rather than by matching on message text. `details` carries
//! the same free-form context the Python prototype attached to its
//! exceptions (`examples/original_source/scripts/errors.py`), kept as a
//! `serde_json::Value` so collaborators can round-trip it into a response
//! body without re-deriving structure from prose.

use std::fmt;

/// The five error kinds from `spec.md` §7, each mapped to a stable process
/// exit code and code string per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Integrity,
    Unexpected,
}

impl ErrorKind {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Integrity => "INTEGRITY_ERROR",
            ErrorKind::Unexpected => "UNEXPECTED_ERROR",
        }
    }

    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Validation => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::Conflict => 4,
            ErrorKind::Integrity => 5,
            ErrorKind::Unexpected => 10,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A tagged, structured error produced by the core.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    details: serde_json::Value,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: serde_json::Value::Object(serde_json::Map::new()),
            source: None,
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    #[must_use]
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integrity, message)
    }

    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn details(&self) -> &serde_json::Value {
        &self.details
    }
}

/// Wraps an I/O failure from the atomic-write or lock primitives as an
/// [`Error`]. Defaults to [`ErrorKind::Unexpected`]; call sites that know
/// the failure reflects a corrupted on-disk structure should instead
/// construct an [`Error::integrity`] directly.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::unexpected(err.to_string()).with_source(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
