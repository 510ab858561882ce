//! Error types for the core client crate.

use streamlens_rs_protocol::ProtocolError;
use thiserror::Error;

use crate::http::ApiError;

/// Errors returned by channel and dashboard operations.
#[derive(Debug, Error)]
pub enum StreamlensCoreError {
    /// The channel supervisor has shut down and can no longer accept work.
    #[error("channel closed")]
    ChannelClosed,
    /// No reply arrived within the configured request timeout.
    #[error("timed out waiting for {action} reply after {timeout_secs}s")]
    Timeout {
        /// Action tag of the request that timed out.
        action: String,
        /// Timeout that elapsed, in seconds.
        timeout_secs: u64,
    },
    /// The backend answered with a non-success status code.
    #[error("backend rejected {action} (status={status}): {message}")]
    Backend {
        /// Action tag of the rejected request.
        action: String,
        /// Status code carried by the reply.
        status: u16,
        /// Error message extracted from the reply body.
        message: String,
    },
    /// A reply body did not decode into the expected shape.
    #[error("malformed {action} reply: {source}")]
    Decode {
        /// Action tag of the reply that failed to decode.
        action: String,
        /// Underlying decode failure.
        #[source]
        source: ProtocolError,
    },
    /// Envelope encoding or frame parsing error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Prompt API or upload transfer error.
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    /// The run has not reported its task id yet; follow-up operations need
    /// a finished run to address.
    #[error("analysis run is not ready: no task id reported yet")]
    RunNotReady,
    /// Retention period must not be negative.
    #[error("invalid retention period: {0}")]
    InvalidPeriod(i64),
    /// Upload source path has no usable file name.
    #[error("cannot derive an upload name from path: {0}")]
    UploadName(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
