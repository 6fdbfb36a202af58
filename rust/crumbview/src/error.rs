//! Unified error handling for the crumbview library.
//!
//! Configuration mistakes (malformed chains, mismatched column types,
//! duplicate names) are reported through [`ViewError`] at construction time.
//! Missing data is never an error: absent foreign keys and empty traversal
//! results flow through the engine as [`crate::Value::Empty`].

use thiserror::Error;

/// Unified error type for crumbview operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ViewError {
    /// A schema definition violates a structural invariant.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// A breadcrumb or chain is malformed.
    #[error("breadcrumb error: {message}")]
    Breadcrumb { message: String },

    /// A composite-column definition is inconsistent.
    #[error("column configuration error: {message}")]
    ColumnConfig { message: String },

    /// A column name was not found where one was required.
    #[error("unknown column '{name}'")]
    UnknownColumn { name: String },

    /// A column name collides with an existing one.
    #[error("duplicate column '{name}'")]
    DuplicateColumn { name: String },

    /// A value of the wrong shape was supplied to a base-table mutation.
    #[error("value error: {message}")]
    Value { message: String },
}

impl ViewError {
    pub fn schema(message: impl Into<String>) -> Self {
        ViewError::Schema {
            message: message.into(),
        }
    }

    pub fn breadcrumb(message: impl Into<String>) -> Self {
        ViewError::Breadcrumb {
            message: message.into(),
        }
    }

    pub fn column_config(message: impl Into<String>) -> Self {
        ViewError::ColumnConfig {
            message: message.into(),
        }
    }
}

/// Result type alias for crumbview operations.
pub type Result<T> = std::result::Result<T, ViewError>;
