//! Core client primitives for the Streamlens dashboard.
//!
//! This crate owns the websocket channel, reply correlation, run aggregation,
//! and the prompt API client used by the CLI and by embedding applications.

pub mod analysis;
pub mod channel;
pub mod chat;
mod dashboard;
pub mod error;
pub mod http;
mod retrieval;
mod videos;

pub use analysis::{RunHandle, RunSnapshot, RunStatus};
pub use channel::{ChannelClient, ChannelEvent};
pub use chat::{ChatMessage, ChatRole, ChatSession};
pub use dashboard::Dashboard;
pub use error::StreamlensCoreError;
pub use http::{
    ApiError, CreatedPrompt, INDUSTRY_TYPES, NewPrompt, PromptApi, PromptRecord, PromptUpdate,
};
pub use videos::PUBLIC_LIBRARY_USER;
