use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

/// Failure kinds of the room, message and membership operations.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("user is already a member of this room")]
    AlreadyMember,

    #[error("user is not a member of this room")]
    NotMember,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),
}

impl ChatError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ChatError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ChatError::Validation(msg.into())
    }

    /// Only an outage of the backing store is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Unavailable(_))
    }

    pub fn kind(&self) -> &'static str {
        use ChatError::*;
        match self {
            NotFound(_) => "not_found",
            Validation(_) => "validation_error",
            Unauthenticated(_) => "unauthenticated",
            Forbidden(_) => "forbidden",
            InvalidOperation(_) => "invalid_operation",
            AlreadyMember => "already_member",
            NotMember => "not_member",
            Conflict(_) => "conflict",
            Unavailable(_) => "unavailable",
            Storage(_) => "storage_error",
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ChatError::not_found("record"),
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_) => ChatError::Unavailable(err),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                ChatError::Conflict(db.message().to_owned())
            }
            err => ChatError::Storage(err),
        }
    }
}
