//! Storage port for message persistence.
//!
//! The streaming core only needs two things from persistence: storing a
//! finished message and reading back recent history. [`MessageStore`] is that
//! port; [`MemoryStore`] is the in-process adapter.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::message::Role;
use crate::session::StoredMessage;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A backend operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// The requested session was not found.
    #[error("session not found: {0}")]
    NotFound(Uuid),
}

/// Port for message storage implementations.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message for a session.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the insert fails.
    async fn save_message(
        &self,
        session_id: Uuid,
        role: Role,
        content: &str,
        token_count: u32,
    ) -> Result<StoredMessage, StorageError>;

    /// Return up to `limit` most recent messages of a session, oldest first.
    ///
    /// An unknown session yields an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the query fails.
    async fn recent_messages(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let db_err = StorageError::Database("connection failed".to_string());
        assert_eq!(db_err.to_string(), "database error: connection failed");

        let id = Uuid::new_v4();
        let not_found = StorageError::NotFound(id);
        assert_eq!(not_found.to_string(), format!("session not found: {}", id));
    }
}
