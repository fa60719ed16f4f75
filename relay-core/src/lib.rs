//! Relay core library.
//!
//! Streams chat replies from an LLM provider to a client as a line-oriented
//! data stream, executing the tools the model calls along the way.

pub mod chat;
pub mod config;
pub mod message;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod storage;
pub mod stream;
pub mod text;
pub mod tools;

pub use chat::{ChatService, TurnError, TurnInput, TurnOutcome};
pub use config::{Config, ConfigError};
pub use message::{Message, Role};
pub use protocol::{FinishReason, MemorySink, ResponseSink, StreamError, StreamWriter, Usage};
pub use provider::{LlmProvider, MockProvider, ProviderError, create_provider};
pub use storage::{MemoryStore, MessageStore, StorageError};
pub use tools::{Tool, ToolRegistry, ToolResult};
