//! In-memory message store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::message::Role;
use crate::session::StoredMessage;
use crate::storage::{MessageStore, StorageError};

/// Message store backed by a process-local map.
///
/// History lives as long as the store; nothing is written to disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<Uuid, Vec<StoredMessage>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages of a session, oldest first.
    pub async fn messages(&self, session_id: Uuid) -> Vec<StoredMessage> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save_message(
        &self,
        session_id: Uuid,
        role: Role,
        content: &str,
        token_count: u32,
    ) -> Result<StoredMessage, StorageError> {
        let message = StoredMessage::new(session_id, role, content, token_count);
        self.sessions
            .write()
            .await
            .entry(session_id)
            .or_default()
            .push(message.clone());
        tracing::debug!(%session_id, role = role.as_str(), "memory_store: message saved");
        Ok(message)
    }

    async fn recent_messages(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError> {
        let sessions = self.sessions.read().await;
        let Some(messages) = sessions.get(&session_id) else {
            return Ok(Vec::new());
        };
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}
