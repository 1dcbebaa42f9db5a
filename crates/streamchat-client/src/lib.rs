//! Streamchat client core
//!
//! This crate provides:
//! - HTTP transport for the chat backend (single-shot and streamed)
//! - Line-framed event decoder tolerant of fragment boundaries
//! - Stream reducer with never-go-backward terminal semantics
//! - Session controller owning the conversation transcript

pub mod api;
pub mod decoder;
pub mod error;
pub mod session;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use api::{ChatApi, ChatBackend, ChunkStream};
pub use decoder::FrameDecoder;
pub use error::{ChatError, Result};
pub use session::{ChatSession, SessionEvent};
pub use state::StreamState;
pub use types::{
    ChatRequest, ChatResponse, ChatSettings, ChunkMetadata, HealthStatus, Message, Role,
    StreamChunk,
};
