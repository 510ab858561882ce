//! Test helpers shared across Streamlens crates.

pub mod backend;
pub mod envelopes;

pub use backend::{Responder, StubBackend};
pub use envelopes::{
    error_reply, notify_end, notify_frame, notify_summary, reply, reply_raw_body, with_correlation,
};
