//! Error types for the document-store engine.

use thiserror::Error;

/// Main error type for document-store operations.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Configuration error (unsupported connection kind, bad options,
    /// unsupported server version). Raised at driver construction, before
    /// any query is attempted.
    #[error("configuration error: {0}")]
    Config(String),

    /// A filter operator that requires host-language callback execution
    /// (`$func`, `$fn`, `$f`, `$fuzzy`) and can never be pushed down to SQL.
    #[error("operator {0} is not supported by the SQL engine")]
    UnsupportedOperator(String),

    /// An unrecognized operator key or malformed filter shape.
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// A recognized operator received an argument of the wrong shape
    /// (e.g. a non-array value for `$all`).
    #[error("invalid argument for {op}: {reason}")]
    InvalidArgument { op: String, reason: String },

    /// A value that cannot be rendered as a SQL scalar literal.
    #[error("cannot encode non-scalar value as SQL literal: {0}")]
    NonScalarValue(String),

    /// A stored row that does not decode to a JSON object, or a document
    /// missing required structure (e.g. no `_id` where one is needed).
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Underlying SQL execution failure. Carries the attempted SQL text and
    /// the backend's native error code for diagnostics.
    #[error("query failed: {message} [sql: {sql}]")]
    Execution {
        sql: String,
        code: Option<String>,
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error (configuration file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        DriverError::Config(message.into())
    }

    /// Create an execution error wrapping a backend failure.
    pub fn execution(
        sql: impl Into<String>,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        DriverError::Execution {
            sql: sql.into(),
            code,
            message: message.into(),
        }
    }
}

/// Result type alias for document-store operations.
pub type Result<T> = std::result::Result<T, DriverError>;
