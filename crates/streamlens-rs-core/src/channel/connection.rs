//! Websocket session supervision and reconnect policy.
//!
//! One spawned task owns the socket for the lifetime of the client. It drives
//! a connect/serve/reconnect loop: queued outbound frames are flushed into
//! whichever session is live, and sessions that drop are replaced after a
//! fixed delay. Connection health is only ever surfaced through the shared
//! connected flag; callers are never failed because the socket went away.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::dispatch::Dispatcher;

/// Everything the supervisor task needs to run.
pub(super) struct SupervisorParams {
    /// Websocket endpoint to dial.
    pub(super) url: String,
    /// Consecutive failed dials tolerated before giving up.
    pub(super) reconnect_attempts: u32,
    /// Pause between dials.
    pub(super) reconnect_delay: Duration,
    /// Frame router shared with the client.
    pub(super) dispatcher: Arc<Dispatcher>,
    /// Outbound frames queued by callers; survives reconnects.
    pub(super) outbound: mpsc::UnboundedReceiver<String>,
    /// Connection health flag observed by callers.
    pub(super) connected: watch::Sender<bool>,
}

/// Why a live session ended.
enum SessionEnd {
    /// The peer closed the socket or the stream ended.
    Closed,
    /// All outbound senders dropped; the client is shutting down.
    Shutdown,
    /// The transport failed mid-session.
    TransportError(tokio_tungstenite::tungstenite::Error),
}

/// Run the connect/serve/reconnect loop until shutdown or the dial cap.
pub(super) async fn run_supervisor(params: SupervisorParams) {
    let SupervisorParams {
        url,
        reconnect_attempts,
        reconnect_delay,
        dispatcher,
        mut outbound,
        connected,
    } = params;

    let mut consecutive_failures = 0u32;
    loop {
        match connect_async(&url).await {
            Ok((stream, _response)) => {
                consecutive_failures = 0;
                info!("channel connected (url={})", url);
                let _ = connected.send(true);
                dispatcher.connection_up();

                let end = drive_session(stream, &mut outbound, &dispatcher).await;

                let _ = connected.send(false);
                dispatcher.connection_down();
                match end {
                    SessionEnd::Closed => {
                        info!("channel session closed (url={})", url);
                    }
                    SessionEnd::Shutdown => {
                        info!("channel shutting down (url={})", url);
                        dispatcher.fail_pending();
                        return;
                    }
                    SessionEnd::TransportError(err) => {
                        warn!("channel session failed (url={}, error={})", url, err);
                    }
                }
            }
            Err(err) => {
                consecutive_failures += 1;
                warn!(
                    "channel connect failed (url={}, attempt={}/{}, error={})",
                    url, consecutive_failures, reconnect_attempts, err
                );
                if consecutive_failures >= reconnect_attempts {
                    warn!(
                        "giving up on channel reconnect (url={}, attempts={})",
                        url, consecutive_failures
                    );
                    dispatcher.fail_pending();
                    return;
                }
            }
        }
        tokio::time::sleep(reconnect_delay).await;
    }
}

/// Serve one live websocket session until it ends.
async fn drive_session(
    mut stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    dispatcher: &Dispatcher,
) -> SessionEnd {
    loop {
        tokio::select! {
            queued = outbound.recv() => {
                match queued {
                    Some(frame) => {
                        debug!("sending frame (len={})", frame.len());
                        if let Err(err) = stream.send(Message::Text(frame)).await {
                            return SessionEnd::TransportError(err);
                        }
                    }
                    None => {
                        let _ = stream.close(None).await;
                        return SessionEnd::Shutdown;
                    }
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(raw))) => dispatcher.dispatch_raw(&raw),
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(err) = stream.send(Message::Pong(payload)).await {
                            return SessionEnd::TransportError(err);
                        }
                    }
                    Some(Ok(Message::Close(_))) => return SessionEnd::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return SessionEnd::TransportError(err),
                    None => return SessionEnd::Closed,
                }
            }
        }
    }
}
