//! Stored conversation records.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::message::{Message, Role};

/// A message persisted for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    /// Unique identifier for the message.
    pub id: Uuid,
    /// The session this message belongs to.
    pub session_id: Uuid,
    /// The role of the message sender.
    pub role: Role,
    /// The text content of the message.
    pub content: String,
    /// Tokens attributed to this message.
    pub token_count: u32,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    /// Create a new stored message.
    ///
    /// Generates a UUID v7 (time-sortable) for the message ID.
    pub fn new(session_id: Uuid, role: Role, content: impl Into<String>, token_count: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            role,
            content: content.into(),
            token_count,
            timestamp: Utc::now(),
        }
    }

    /// Convert into a provider-facing [`Message`].
    pub fn to_message(&self) -> Message {
        Message::new(self.role, &self.content)
    }
}
