//! Error taxonomy surfaced by builders and the mutation pipeline.

use thiserror::Error;

use crate::persist::DriverError;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by builders, hooks, and the core executor.
#[derive(Debug, Error)]
pub enum Error {
    /// A field is missing or fails a declared validator. Raised before any
    /// storage call.
    #[error("entmut: validation failed for field {field:?}: {cause}")]
    Validation {
        /// Name of the offending field.
        field: String,
        /// Why validation failed.
        cause: String,
    },

    /// A single-entity update or delete matched no row.
    #[error("entmut: {label} not found")]
    NotFound {
        /// Entity label.
        label: String,
    },

    /// A query expected exactly one row and found several.
    #[error("entmut: {label} not singular")]
    NotSingular {
        /// Entity label.
        label: String,
    },

    /// The store rejected a write on a uniqueness or foreign-key constraint.
    #[error("entmut: constraint failed: {message}")]
    Constraint {
        /// Driver message.
        message: String,
        /// The driver failure.
        #[source]
        source: DriverError,
    },

    /// Schema or provider configuration is incomplete.
    #[error("entmut: {0}")]
    Config(String),

    /// The mutation was already executed once.
    #[error("entmut: mutation already executed")]
    AlreadyExecuted,

    /// A hook refused the mutation.
    #[error("entmut: {0}")]
    Rejected(String),

    /// Any other driver failure, passed through unclassified.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl Error {
    /// A validation failure on `field`.
    pub fn validation(field: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            cause: cause.into(),
        }
    }

    /// The error for an unset required field.
    pub fn missing_required(label: &str, field: &str) -> Self {
        Self::validation(field, format!("missing required field \"{label}.{field}\""))
    }

    /// A not-found error for `label`.
    pub fn not_found(label: impl Into<String>) -> Self {
        Self::NotFound {
            label: label.into(),
        }
    }

    /// A configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Maps a driver failure onto the taxonomy.
    ///
    /// `is_constraint` is the driver's own verdict on the error.
    pub fn classify(err: DriverError, label: &str, is_constraint: bool) -> Self {
        match err {
            DriverError::NotFound => Self::not_found(label),
            err if is_constraint => Self::Constraint {
                message: err.to_string(),
                source: err,
            },
            err => Self::Driver(err),
        }
    }

    /// True for [`Error::Validation`].
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// True for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for [`Error::NotSingular`].
    pub fn is_not_singular(&self) -> bool {
        matches!(self, Self::NotSingular { .. })
    }

    /// True for [`Error::Constraint`].
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }
}
