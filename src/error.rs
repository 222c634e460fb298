//! The error kinds surfaced by the processing core, and the last-error sink.
//!
//! Every fallible public operation returns a [`Result`] whose error type is
//! either a subsystem-specific enum or the crate-wide [`CoreError`]. The
//! subsystem enums all convert into [`CoreError`] so callers at the outer
//! boundary can handle a single type.
use std::fmt::Display;
use std::sync::{Mutex, OnceLock};

use thiserror::Error;

/// The crate-wide error type. Variant names follow the failure taxonomy of
/// the processing core; each carries a human-readable message.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Element not found: {0}")]
    ElementNotFound(String),
    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Index underflow: {index} < {min}")]
    IndexUnderflow { index: i64, min: i64 },
    #[error("Index overflow: {index} >= {size}")]
    IndexOverflow { index: usize, size: usize },
    #[error("Precondition violated: {0}")]
    Precondition(String),
    #[error("Postcondition violated: {0}")]
    Postcondition(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("File not readable: {0}")]
    FileNotReadable(String),
    #[error("File not writable: {0}")]
    FileNotWritable(String),
    #[error("File is empty: {0}")]
    FileEmpty(String),
    #[error("Unable to create file: {0}")]
    UnableToCreateFile(String),
    #[error("Conversion error: {0}")]
    ConversionError(String),
    #[error("Unable to fit: {0}")]
    UnableToFit(String),
    #[error("Depleted id pool")]
    DepletedIdPool,
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),
    #[error("Illegal self operation: {0}")]
    IllegalSelfOperation(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Out of range: {0}")]
    OutOfRange(String),
}

impl CoreError {
    /// The taxonomy name of this error kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            CoreError::Parse(_) => "ParseError",
            CoreError::ElementNotFound(_) => "ElementNotFound",
            CoreError::InvalidValue { .. } => "InvalidValue",
            CoreError::InvalidParameter(_) => "InvalidParameter",
            CoreError::IndexUnderflow { .. } => "IndexUnderflow",
            CoreError::IndexOverflow { .. } => "IndexOverflow",
            CoreError::Precondition(_) => "Precondition",
            CoreError::Postcondition(_) => "Postcondition",
            CoreError::Io(_) => "IOException",
            CoreError::FileNotFound(_) => "FileNotFound",
            CoreError::FileNotReadable(_) => "FileNotReadable",
            CoreError::FileNotWritable(_) => "FileNotWritable",
            CoreError::FileEmpty(_) => "FileEmpty",
            CoreError::UnableToCreateFile(_) => "UnableToCreateFile",
            CoreError::ConversionError(_) => "ConversionError",
            CoreError::UnableToFit(_) => "UnableToFit",
            CoreError::DepletedIdPool => "DepletedIdPool",
            CoreError::NotImplemented(_) => "NotImplemented",
            CoreError::IllegalArgument(_) => "IllegalArgument",
            CoreError::IllegalSelfOperation(_) => "IllegalSelfOperation",
            CoreError::DivisionByZero => "DivisionByZero",
            CoreError::InvalidRange(_) => "InvalidRange",
            CoreError::OutOfRange(_) => "OutOfRange",
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(value: std::io::Error) -> Self {
        match value.kind() {
            std::io::ErrorKind::NotFound => CoreError::FileNotFound(value.to_string()),
            std::io::ErrorKind::PermissionDenied => CoreError::FileNotReadable(value.to_string()),
            _ => CoreError::Io(value.to_string()),
        }
    }
}

/// A record of the most recent error observed by a [`CoreContext`].
#[derive(Debug, Clone, PartialEq)]
pub struct LastError {
    pub kind: String,
    pub message: String,
}

/// Holds cross-cutting mutable state for a processing session: currently the
/// last-error record. A process-wide default context exists behind
/// [`CoreContext::global`], but tests and embedders may construct
/// independent contexts and thread them explicitly.
#[derive(Debug, Default)]
pub struct CoreContext {
    last_error: Mutex<Option<LastError>>,
}

impl CoreContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide context.
    pub fn global() -> &'static CoreContext {
        static GLOBAL: OnceLock<CoreContext> = OnceLock::new();
        GLOBAL.get_or_init(CoreContext::new)
    }

    /// Record `error` as the most recent failure, overwriting any prior
    /// record, and pass it through unchanged.
    pub fn record<E: Display>(&self, kind: &str, error: E) {
        let mut guard = self.last_error.lock().unwrap();
        *guard = Some(LastError {
            kind: kind.to_string(),
            message: error.to_string(),
        });
    }

    /// Record a [`CoreError`] under its own kind name.
    pub fn record_error(&self, error: &CoreError) {
        self.record(error.kind_name(), error)
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.last_error.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        *self.last_error.lock().unwrap() = None;
    }
}

/// Record `err` in the global context and return it, for use at public API
/// boundaries: `fallible().map_err(record_global)?`
pub fn record_global(err: CoreError) -> CoreError {
    CoreContext::global().record_error(&err);
    err
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(CoreError::DivisionByZero.kind_name(), "DivisionByZero");
        let e = CoreError::InvalidValue {
            name: "reporter_mass_shift".into(),
            message: "below minimum".into(),
        };
        assert_eq!(e.kind_name(), "InvalidValue");
        assert!(e.to_string().contains("reporter_mass_shift"));
    }

    #[test]
    fn test_independent_contexts() {
        let a = CoreContext::new();
        let b = CoreContext::new();
        a.record_error(&CoreError::DepletedIdPool);
        assert_eq!(a.last_error().unwrap().kind, "DepletedIdPool");
        assert!(b.last_error().is_none());
        a.clear();
        assert!(a.last_error().is_none());
    }

    #[test]
    fn test_global_sink_overwrites() {
        let ctx = CoreContext::global();
        ctx.record_error(&CoreError::DivisionByZero);
        ctx.record_error(&CoreError::DepletedIdPool);
        assert_eq!(ctx.last_error().unwrap().kind, "DepletedIdPool");
        ctx.clear();
    }
}
