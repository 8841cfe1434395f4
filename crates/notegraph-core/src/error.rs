//! Error types for notegraph.

use thiserror::Error;

/// Result type alias using notegraph's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for notegraph operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// Queue item not found
    #[error("Queue item not found: {0}")]
    QueueItemNotFound(uuid::Uuid),

    /// Entity mention normalizes to an empty key
    #[error("Invalid entity name: {0:?}")]
    InvalidEntityName(String),

    /// Extraction collaborator failed or returned an unusable payload
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Notification delivery failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// A collaborator call exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error is scoped to a single entity mention and should not
    /// abort the surrounding note.
    pub fn is_entity_local(&self) -> bool {
        matches!(self, Error::InvalidEntityName(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_note_not_found() {
        let id = Uuid::nil();
        let err = Error::NoteNotFound(id);
        assert_eq!(err.to_string(), format!("Note not found: {}", id));
    }

    #[test]
    fn test_error_display_queue_item_not_found() {
        let id = Uuid::new_v4();
        let err = Error::QueueItemNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_invalid_entity_name() {
        let err = Error::InvalidEntityName("!!!".to_string());
        assert_eq!(err.to_string(), "Invalid entity name: \"!!!\"");
    }

    #[test]
    fn test_error_display_extraction() {
        let err = Error::Extraction("missing summary".to_string());
        assert_eq!(err.to_string(), "Extraction error: missing summary");
    }

    #[test]
    fn test_error_display_timeout() {
        let err = Error::Timeout("extraction after 120s".to_string());
        assert_eq!(err.to_string(), "Timed out: extraction after 120s");
    }

    #[test]
    fn test_entity_local_classification() {
        assert!(Error::InvalidEntityName(String::new()).is_entity_local());
        assert!(!Error::Extraction("x".into()).is_entity_local());
        assert!(!Error::NoteNotFound(Uuid::nil()).is_entity_local());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
