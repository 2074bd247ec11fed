//! Error handling for the vote ledger

/// Result type alias for the vote ledger
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of failures, as seen by callers of the API layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Integrity,
    Io,
    Internal,
}

/// Main error type for the vote ledger
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Unknown voter or other missing entity
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Already voted, duplicate registration
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Malformed identifiers or rejected input
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Broken hash chain or structurally invalid persisted data
    #[error("Integrity error: {message}")]
    Integrity { message: String },

    /// Persistence failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors (poisoned locks, clock failures)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a new conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a new integrity error
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Integrity { .. } | Self::Serialization(_) => ErrorKind::Integrity,
            Self::Io(_) => ErrorKind::Io,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

/// Convenience macros for creating specific error types
#[macro_export]
macro_rules! integrity_error {
    ($msg:expr) => {
        $crate::Error::integrity($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::integrity(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::Error::internal($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::internal(format!($fmt, $($arg)*))
    };
}
