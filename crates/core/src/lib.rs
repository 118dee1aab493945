//! # Depo Core
//!
//! Domain types, traits, and error definitions for the deposition assistant.
//! This crate has **zero framework dependencies**; it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model provider, tool adapter, session store,
//! trace sink) is defined as a trait here. Implementations live in their
//! respective crates, so the agent core can be exercised with scripted mocks
//! and swapped backends without touching the loop itself.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
pub mod strategy;
pub mod tool;
pub mod trace;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, SessionError, ToolError, TraceError};
pub use event::{EventBus, TurnEvent};
pub use message::{ConversationId, Message, MessageToolCall, Role};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, StreamChunk,
    ToolDefinition, Usage,
};
pub use session::{SessionRecord, SessionStore, TranscriptEntry};
pub use strategy::StrategyKind;
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use trace::{FeedbackRecord, SpanContext, SpanHandle, SpanUpdate, TraceSink};
