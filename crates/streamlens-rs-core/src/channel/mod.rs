//! Shared websocket channel for the dashboard backend.
//!
//! All request/response traffic and push notifications for a dashboard
//! session travel over one persistent websocket. [`ChannelClient`] queues
//! outbound requests, pairs replies with callers, and rebroadcasts
//! everything it hears on an event bus.

mod connection;
mod dispatch;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use streamlens_rs_config::ChannelConfig;
use streamlens_rs_protocol::{CorrelationId, Reply, Request, RequestEnvelope};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::StreamlensCoreError;
use connection::{SupervisorParams, run_supervisor};
pub use dispatch::ChannelEvent;
use dispatch::Dispatcher;

/// Handle to the shared websocket channel.
///
/// Cloning is cheap; all clones share one socket and one supervisor task.
#[derive(Clone)]
pub struct ChannelClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    dispatcher: Arc<Dispatcher>,
    connected: watch::Receiver<bool>,
    request_timeout: Option<Duration>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelClient {
    /// Start the channel supervisor and return a client handle.
    ///
    /// Must be called from within a Tokio runtime. The connection is
    /// established in the background; requests queued before it is up are
    /// flushed once the first session is live.
    pub fn connect(url: impl Into<String>, options: &ChannelConfig) -> Self {
        let url = url.into();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = watch::channel(false);
        let dispatcher = Arc::new(Dispatcher::new(options.event_buffer));

        info!(
            "starting channel supervisor (url={}, reconnect_attempts={})",
            url, options.reconnect_attempts
        );
        let supervisor = tokio::spawn(run_supervisor(SupervisorParams {
            url,
            reconnect_attempts: options.reconnect_attempts,
            reconnect_delay: Duration::from_millis(options.reconnect_delay_ms),
            dispatcher: dispatcher.clone(),
            outbound: outbound_rx,
            connected: connected_tx,
        }));

        Self {
            inner: Arc::new(ClientInner {
                outbound: Mutex::new(Some(outbound_tx)),
                dispatcher,
                connected: connected_rx,
                request_timeout: options.request_timeout_secs.map(Duration::from_secs),
                supervisor: Mutex::new(Some(supervisor)),
            }),
        }
    }

    /// Whether a websocket session is currently live.
    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Watch the connection flag for changes.
    pub fn connected_watch(&self) -> watch::Receiver<bool> {
        self.inner.connected.clone()
    }

    /// Wait until a session is live; false when the supervisor has exited.
    pub async fn wait_connected(&self) -> bool {
        let mut connected = self.inner.connected.clone();
        loop {
            if *connected.borrow() {
                return true;
            }
            if connected.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Subscribe to every parsed inbound frame and connection transition.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.dispatcher.subscribe()
    }

    /// Queue a request without waiting for any reply.
    pub fn send(&self, request: Request) -> Result<CorrelationId, StreamlensCoreError> {
        let envelope = RequestEnvelope::new(request);
        let frame = envelope.encode()?;
        debug!(
            "queueing request (action={}, correlation_id={})",
            envelope.request.action(),
            envelope.correlation_id
        );
        self.send_frame(frame)?;
        Ok(envelope.correlation_id)
    }

    /// Send a request and wait for its reply.
    ///
    /// Replies are paired by echoed correlation id when the backend supports
    /// it, falling back to FIFO order per action tag. Non-success status
    /// codes are converted into [`StreamlensCoreError::Backend`] here so that
    /// individual operations never re-implement that check.
    pub async fn call(&self, request: Request) -> Result<Reply, StreamlensCoreError> {
        let action = request.action();
        let envelope = RequestEnvelope::new(request);
        let correlation_id = envelope.correlation_id;
        let receiver = self.inner.dispatcher.register(action, correlation_id);

        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(err) => {
                self.inner.dispatcher.abandon(action, correlation_id);
                return Err(err.into());
            }
        };
        if let Err(err) = self.send_frame(frame) {
            self.inner.dispatcher.abandon(action, correlation_id);
            return Err(err);
        }

        debug!(
            "awaiting reply (action={}, correlation_id={})",
            action, correlation_id
        );
        let reply = match self.inner.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, receiver).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(_)) => return Err(StreamlensCoreError::ChannelClosed),
                Err(_) => {
                    self.inner.dispatcher.abandon(action, correlation_id);
                    return Err(StreamlensCoreError::Timeout {
                        action: action.to_string(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
            },
            None => receiver
                .await
                .map_err(|_| StreamlensCoreError::ChannelClosed)?,
        };

        if !reply.ok() {
            return Err(StreamlensCoreError::Backend {
                action: action.to_string(),
                status: reply.status_code(),
                message: reply.error_message(),
            });
        }
        Ok(reply)
    }

    /// Close the channel and wait for the supervisor to exit.
    pub async fn close(&self) {
        self.inner.outbound.lock().take();
        let supervisor = self.inner.supervisor.lock().take();
        if let Some(handle) = supervisor {
            let _ = handle.await;
        }
    }

    fn send_frame(&self, frame: String) -> Result<(), StreamlensCoreError> {
        let sender = self.inner.outbound.lock().clone();
        let Some(sender) = sender else {
            return Err(StreamlensCoreError::ChannelClosed);
        };
        sender
            .send(frame)
            .map_err(|_| StreamlensCoreError::ChannelClosed)
    }
}

/// Decode a reply body, tagging failures with the owning action.
pub(crate) fn decode_reply<T>(action: &str, reply: &Reply) -> Result<T, StreamlensCoreError>
where
    T: DeserializeOwned,
{
    reply
        .decode_body()
        .map_err(|source| StreamlensCoreError::Decode {
            action: action.to_string(),
            source,
        })
}
