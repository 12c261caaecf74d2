/*!
Defines the [EngineError] and [Result] types used throughout the engine.

Every variant corresponds to one of the error codes a response envelope
may surface; [EngineError::code] returns the stable string clients match
on.
*/

use thiserror::Error;

/// Engine error type. Each variant carries a human-readable message and
/// maps to a stable error code in the response envelope.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed envelope or missing required field.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Schema declaration violates the nesting/primitive-name rules.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A row batch does not match the table's physical schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Table or namespace absent.
    #[error("not found: {0}")]
    NotFound(String),
    /// `CREATE_TABLE` without `if_not_exists` against an existing table.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// A filter value is incompatible with the column's type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// `HARD_DELETE` submitted without `confirm: true`.
    #[error("confirmation required: {0}")]
    ConfirmationRequired(String),
    /// Catalog commit conflict that persisted after all retries.
    #[error("write conflict: {0}")]
    WriteConflict(String),
    /// Memory, size, or rate limit exceeded.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Operation deadline expired.
    #[error("timeout: {0}")]
    Timeout(String),
    /// Unclassified failure; the message summarizes the underlying cause.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The stable error code surfaced in the response envelope's `error.code`.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidRequest(_) => "InvalidRequest",
            EngineError::InvalidSchema(_) => "InvalidSchema",
            EngineError::SchemaMismatch(_) => "SchemaMismatch",
            EngineError::NotFound(_) => "NotFound",
            EngineError::AlreadyExists(_) => "AlreadyExists",
            EngineError::TypeMismatch(_) => "TypeMismatch",
            EngineError::ConfirmationRequired(_) => "ConfirmationRequired",
            EngineError::WriteConflict(_) => "WriteConflict",
            EngineError::ResourceExhausted(_) => "ResourceExhausted",
            EngineError::Timeout(_) => "Timeout",
            EngineError::Internal(_) => "Internal",
        }
    }

    /// Whether a write that failed with this error is worth retrying by
    /// re-resolving metadata and re-committing.
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, EngineError::WriteConflict(_))
    }
}

/// Engine result type.
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<object_store::Error> for EngineError {
    fn from(err: object_store::Error) -> Self {
        EngineError::Internal(format!("object store error: {err}"))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Internal(format!("json error: {err}"))
    }
}

impl From<apache_avro::Error> for EngineError {
    fn from(err: apache_avro::Error) -> Self {
        EngineError::Internal(format!("avro error: {err}"))
    }
}

impl From<tokio::time::error::Elapsed> for EngineError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        EngineError::Timeout("operation deadline exceeded".to_string())
    }
}
