//! Common error types for Moonarch

use thiserror::Error;

/// Common result type for Moonarch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Moonarch services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource exists but is not ready yet (e.g. processing not complete)
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Illegal lifecycle transition
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Concurrent modification detected by a persisted store
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors that may succeed when the operation is retried
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            Error::Database(db_err) => db_err.to_string().contains("database is locked"),
            Error::Conflict(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_transient() {
        assert!(Error::Conflict("revision 3".to_string()).is_transient());
        assert!(!Error::NotFound("task".to_string()).is_transient());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::InvalidTransition {
            from: "completed".to_string(),
            to: "processing".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid transition from completed to processing");
    }
}
