use thiserror::Error;

use crate::types::ConversionError;

/// Error type for dbexec operations
#[derive(Debug, Error)]
pub enum DbExecError {
    /// A required argument was missing or malformed. Always raised before any I/O.
    #[error("Invalid argument `{argument}`: {message}")]
    InvalidArgument {
        argument: &'static str,
        message: String,
    },

    #[error("Could not create a data adapter for {type_name}")]
    UnsupportedDriver { type_name: String },

    #[error("Could not convert column {column}: {source}")]
    Conversion {
        column: usize,
        #[source]
        source: ConversionError,
    },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Command timed out after {0} second(s)")]
    Timeout(u32),

    /// An error raised by the driver, passed through untouched.
    #[error(transparent)]
    Driver(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl DbExecError {
    pub(crate) fn invalid_argument(argument: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            message: message.into(),
        }
    }

    /// Returns true for errors raised by argument validation.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}

/// Result type alias for dbexec operations
pub type Result<T> = std::result::Result<T, DbExecError>;
