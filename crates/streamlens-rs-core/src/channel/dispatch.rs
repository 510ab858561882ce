//! Inbound frame routing for the shared websocket channel.
//!
//! Every frame the backend sends arrives on one socket; this module decides
//! who hears about it. Replies resolve pending callers, first by echoed
//! correlation id and otherwise in FIFO order per action tag. Everything that
//! parses is also rebroadcast on an observational event bus so that stream
//! consumers (run aggregation, UIs) can follow along.

use std::collections::{HashMap, VecDeque};

use log::{debug, warn};
use parking_lot::Mutex;
use streamlens_rs_protocol::{CorrelationId, Inbound, Notification, Reply};
use tokio::sync::{broadcast, oneshot};

/// Events published on the channel's broadcast bus.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The websocket session was (re)established.
    Connected,
    /// The websocket session ended; the supervisor may reconnect.
    Disconnected,
    /// A reply frame arrived, whether or not a caller claimed it.
    Reply(Reply),
    /// A push notification arrived.
    Notification(Notification),
}

/// A caller waiting for a reply to a specific request.
struct Waiter {
    correlation_id: CorrelationId,
    tx: oneshot::Sender<Reply>,
}

/// Routes inbound frames to waiting callers and the event bus.
pub(crate) struct Dispatcher {
    waiters: Mutex<HashMap<String, VecDeque<Waiter>>>,
    events: broadcast::Sender<ChannelEvent>,
}

impl Dispatcher {
    /// Create a dispatcher with the given event bus buffer.
    pub(crate) fn new(event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer);
        Self {
            waiters: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to the observational event stream.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Register a waiter for the given action before the request is sent.
    pub(crate) fn register(
        &self,
        action: &str,
        correlation_id: CorrelationId,
    ) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock();
        waiters.entry(action.to_string()).or_default().push_back(Waiter {
            correlation_id,
            tx,
        });
        rx
    }

    /// Remove a waiter whose caller gave up (send failure or timeout).
    pub(crate) fn abandon(&self, action: &str, correlation_id: CorrelationId) {
        let mut waiters = self.waiters.lock();
        if let Some(queue) = waiters.get_mut(action) {
            queue.retain(|waiter| waiter.correlation_id != correlation_id);
            if queue.is_empty() {
                waiters.remove(action);
            }
        }
    }

    /// Number of callers currently waiting for a reply.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.waiters.lock().values().map(VecDeque::len).sum()
    }

    /// Drop every pending waiter; their callers observe a closed channel.
    ///
    /// Callers waiting across a reconnect are left alone until the supervisor
    /// exits for good; only then is hanging them forever worse than failing.
    pub(crate) fn fail_pending(&self) {
        let mut waiters = self.waiters.lock();
        let dropped: usize = waiters.values().map(VecDeque::len).sum();
        if dropped > 0 {
            warn!("failing pending callers on shutdown (count={})", dropped);
        }
        waiters.clear();
    }

    /// Publish a connection-established event.
    pub(crate) fn connection_up(&self) {
        let _ = self.events.send(ChannelEvent::Connected);
    }

    /// Publish a connection-lost event.
    pub(crate) fn connection_down(&self) {
        let _ = self.events.send(ChannelEvent::Disconnected);
    }

    /// Parse one raw text frame and route it.
    ///
    /// Malformed frames are logged once and dropped without touching any
    /// waiter or stream state.
    pub(crate) fn dispatch_raw(&self, raw: &str) {
        match Inbound::parse(raw) {
            Ok(Inbound::Reply(reply)) => self.route_reply(reply),
            Ok(Inbound::Push(notification)) => {
                let _ = self.events.send(ChannelEvent::Notification(notification));
            }
            Err(err) => {
                warn!("discarding malformed frame (len={}, error={})", raw.len(), err);
            }
        }
    }

    /// Resolve a reply against pending waiters.
    fn route_reply(&self, reply: Reply) {
        let _ = self.events.send(ChannelEvent::Reply(reply.clone()));

        let mut waiters = self.waiters.lock();
        if let Some(correlation_id) = reply.correlation_id {
            match take_by_correlation(&mut waiters, reply.action.as_deref(), correlation_id) {
                Some(waiter) => {
                    let _ = waiter.tx.send(reply);
                }
                // A late reply to an abandoned call; never steal the FIFO head.
                None => {
                    debug!(
                        "reply correlation id matched no waiter (correlation_id={})",
                        correlation_id
                    );
                }
            }
            return;
        }

        let Some(action) = reply.action.clone() else {
            debug!("unroutable reply without action (status={})", reply.status_code());
            return;
        };
        let waiter = waiters.get_mut(&action).and_then(VecDeque::pop_front);
        match waiter {
            Some(waiter) => {
                if waiters.get(&action).is_some_and(VecDeque::is_empty) {
                    waiters.remove(&action);
                }
                let _ = waiter.tx.send(reply);
            }
            None => {
                debug!(
                    "unmatched reply (action={}, status={})",
                    action,
                    reply.status_code()
                );
            }
        }
    }
}

/// Remove the waiter registered under `correlation_id`, searching the action's
/// queue when the reply names one and every queue otherwise.
fn take_by_correlation(
    waiters: &mut HashMap<String, VecDeque<Waiter>>,
    action: Option<&str>,
    correlation_id: CorrelationId,
) -> Option<Waiter> {
    let key = match action {
        Some(action) => waiters.contains_key(action).then(|| action.to_string()),
        None => waiters
            .iter()
            .find(|(_, queue)| {
                queue
                    .iter()
                    .any(|waiter| waiter.correlation_id == correlation_id)
            })
            .map(|(key, _)| key.clone()),
    }?;

    let queue = waiters.get_mut(&key)?;
    let index = queue
        .iter()
        .position(|waiter| waiter.correlation_id == correlation_id)?;
    let waiter = queue.remove(index);
    if queue.is_empty() {
        waiters.remove(&key);
    }
    waiter
}
