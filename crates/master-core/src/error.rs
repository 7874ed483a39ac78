use thiserror::Error;

/// Errors that can occur in master-core operations.
#[derive(Error, Debug)]
pub enum MasterError {
    /// Entity id missing; surfaced to the admin as a 404-equivalent.
    #[error("{resource} not found: {name}")]
    NotFound { resource: String, name: String },

    /// Uniqueness violation or an operation the current state forbids.
    #[error("{0}")]
    Conflict(String),

    /// Malformed input: bad template JSON, missing slave id, index out of range.
    #[error("{0}")]
    Invalid(String),

    /// No live link registered for the slave.
    #[error("slave {0} not connected")]
    NotConnected(i64),

    /// I/O failure on a live link; absorbed by detach, never shown to admins.
    #[error("link transport error: {0}")]
    Transport(String),

    /// Database error, surfaced to the caller unchanged.
    #[error("database error: {0}")]
    Storage(#[from] state_store::DbError),

    /// Failed admin session check or wrong slave secret.
    #[error("unauthorized")]
    Unauthorized,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for master-core operations
pub type MasterResult<T> = Result<T, MasterError>;

impl MasterError {
    /// Create a not found error
    pub fn not_found(resource: impl Into<String>, name: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            name: name.to_string(),
        }
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an invalid-input error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

// Allow conversion from sqlx::Error
impl From<sqlx::Error> for MasterError {
    fn from(err: sqlx::Error) -> Self {
        MasterError::Storage(state_store::DbError::from(err))
    }
}
