//! [`StreamClient`] and its connection driver.
//!
//! One spawned task owns the transport for the lifetime of a driver run:
//! it connects, pumps inbound frames into the handler registry, forwards
//! outbound text, and on an unexpected close waits out the backoff delay
//! before connecting again. Cancelling the run's token stops all of it,
//! including a pending reconnect sleep.
//!
//! Delivery is at-most-once: frames that arrive while disconnected are
//! never replayed. Subscribers that need a consistent view should
//! re-request state when `reconnected` fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::envelope::{Envelope, EventKind};
use crate::errors::{Result, StreamError};
use crate::registry::{HandlerId, HandlerRegistry};
use crate::state::ConnectionState;
use crate::transport::{ABNORMAL_CLOSURE, Connector, Frame, Transport, TungsteniteConnector};

/// Upper bound on waiting for the close handshake on manual disconnect.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
/// Close code reported for operator-initiated disconnects.
const NORMAL_CLOSURE: u16 = 1000;

/// Long-lived subscription to the server-pushed metrics feed.
///
/// Construction validates the address and starts connecting in the
/// background on the current Tokio runtime. Register handlers with
/// [`on`](Self::on) right after construction; the first connection attempt
/// runs once the caller yields.
///
/// Dropping the client cancels the driver and closes the connection.
pub struct StreamClient {
    shared: Arc<Shared>,
}

struct Shared {
    url: String,
    config: StreamConfig,
    connector: Arc<dyn Connector>,
    state: watch::Sender<ConnectionState>,
    registry: Mutex<HandlerRegistry>,
    attempts: AtomicU32,
    manual_disconnect: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    driver: Mutex<Option<CancellationToken>>,
}

impl StreamClient {
    /// Connect to `url` over WebSocket.
    ///
    /// Fails without touching the network when `url` is empty or not a
    /// `ws://` / `wss://` address.
    pub fn new(url: &str, config: StreamConfig) -> Result<Self> {
        Self::with_connector(url, config, Arc::new(TungsteniteConnector))
    }

    /// Connect to `url` through a custom transport.
    pub fn with_connector(
        url: &str,
        config: StreamConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        validate_url(url)?;
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let client = Self {
            shared: Arc::new(Shared {
                url: url.trim().to_owned(),
                config,
                connector,
                state,
                registry: Mutex::new(HandlerRegistry::new()),
                attempts: AtomicU32::new(0),
                manual_disconnect: AtomicBool::new(false),
                outbound: Mutex::new(None),
                driver: Mutex::new(None),
            }),
        };
        client.start();
        Ok(client)
    }

    /// Address this client connects to.
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Register `handler` for `kind`. Handlers for one kind run in
    /// registration order.
    pub fn on<F>(&self, kind: impl Into<EventKind>, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared
            .registry
            .lock()
            .insert(kind.into(), Arc::new(handler))
    }

    /// Remove every handler registered for `kind`.
    pub fn off(&self, kind: impl Into<EventKind>) {
        let kind = kind.into();
        let removed = self.shared.registry.lock().remove_kind(&kind);
        debug!(kind = %kind, removed, "handlers removed");
    }

    /// Remove a single handler.
    pub fn off_handler(&self, id: HandlerId) -> bool {
        self.shared.registry.lock().remove(id)
    }

    /// Whether the connection is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Consecutive reconnect attempts since the last successful connection.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Serialize `message` as JSON and send it.
    ///
    /// Fails with [`StreamError::NotConnected`] unless the connection is open.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let text =
            serde_json::to_string(message).map_err(|e| StreamError::Serialize(e.to_string()))?;
        self.send_text(text)
    }

    /// Send a raw text frame.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        if !self.is_connected() {
            return Err(StreamError::NotConnected);
        }
        let outbound = self.shared.outbound.lock();
        let tx = outbound.as_ref().ok_or(StreamError::NotConnected)?;
        tx.send(text.into()).map_err(|_| StreamError::NotConnected)
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Pending reconnect timers are cancelled. Calling this again is a no-op.
    pub fn disconnect(&self) {
        if self.shared.manual_disconnect.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(url = %self.shared.url, "disconnecting");
        drop(self.shared.outbound.lock().take());
        if let Some(token) = self.shared.driver.lock().take() {
            token.cancel();
        }
        if self.shared.close_state() == Some(ConnectionState::Open) {
            self.shared.emit(
                &EventKind::Disconnect,
                &json!({ "code": NORMAL_CLOSURE, "reason": "client disconnect" }),
            );
        }
    }

    /// Start over after [`disconnect`](Self::disconnect) or after automatic
    /// reconnection gave up. Resets the attempt counter.
    pub fn reconnect(&self) {
        info!(url = %self.shared.url, "manual reconnect");
        self.shared.manual_disconnect.store(false, Ordering::SeqCst);
        self.shared.attempts.store(0, Ordering::SeqCst);
        self.start();
    }

    fn start(&self) {
        let token = CancellationToken::new();
        if let Some(previous) = self.shared.driver.lock().replace(token.clone()) {
            previous.cancel();
        }
        drop(tokio::spawn(run_driver(Arc::clone(&self.shared), token)));
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        if let Some(token) = self.shared.driver.lock().take() {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("url", &self.shared.url)
            .field("state", &self.state())
            .field("attempts", &self.reconnect_attempts())
            .finish_non_exhaustive()
    }
}

fn validate_url(url: &str) -> Result<()> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(StreamError::MissingUrl);
    }
    let invalid = |reason: String| StreamError::InvalidUrl {
        url: trimmed.to_owned(),
        reason,
    };
    let uri: Uri = trimmed.parse().map_err(|e| invalid(format!("{e}")))?;
    if !matches!(uri.scheme_str(), Some("ws" | "wss")) {
        return Err(invalid("scheme must be ws or wss".into()));
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(invalid("missing host".into()));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

impl Shared {
    /// Move to `next` on behalf of the driver run owning `cancel`. Refused
    /// once that run is cancelled or the client was disconnected; the check
    /// and the store share the state lock, so a concurrent `disconnect`
    /// always leaves the client closed.
    fn advance(&self, cancel: &CancellationToken, next: ConnectionState) -> bool {
        let mut accepted = false;
        let mut previous = next;
        let _ = self.state.send_if_modified(|state| {
            if cancel.is_cancelled() || self.is_manual() {
                return false;
            }
            accepted = true;
            previous = std::mem::replace(state, next);
            previous != next
        });
        if accepted && previous != next {
            debug!(from = %previous, to = %next, "connection state");
        }
        accepted
    }

    /// Move to `Closed`. Returns the prior state if this call made the
    /// transition, so exactly one path reports a given close.
    fn close_state(&self) -> Option<ConnectionState> {
        let mut previous = None;
        let _ = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                false
            } else {
                previous = Some(*state);
                *state = ConnectionState::Closed;
                true
            }
        });
        previous
    }

    fn is_manual(&self) -> bool {
        self.manual_disconnect.load(Ordering::SeqCst)
    }

    fn emit(&self, kind: &EventKind, payload: &Value) {
        let handlers = self.registry.lock().snapshot(kind);
        for handler in handlers {
            handler(payload);
        }
    }

    fn emit_error(&self, err: &StreamError) {
        self.emit(
            &EventKind::Error,
            &json!({ "message": err.to_string(), "category": err.category() }),
        );
    }

    fn route(&self, text: &str) {
        match Envelope::parse(text) {
            Ok(envelope) => {
                let kind = envelope.event_kind();
                if kind.is_lifecycle() {
                    warn!(kind = %kind, "dropping frame with reserved type");
                    self.emit_error(&StreamError::ReservedType(kind.as_str().to_owned()));
                    return;
                }
                metrics::counter!("stream_messages_total", "type" => kind.as_str().to_owned())
                    .increment(1);
                self.emit(&kind, &envelope.data);
            }
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
                self.emit_error(&err);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

enum SessionEnd {
    Cancelled,
    Closed { code: u16, reason: String },
}

#[allow(clippy::cast_possible_truncation)]
async fn run_driver(shared: Arc<Shared>, cancel: CancellationToken) {
    let backoff = shared.config.backoff();

    loop {
        if !shared.advance(&cancel, ConnectionState::Connecting) {
            return;
        }
        debug!(url = %shared.url, "connecting");

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = shared.connector.connect(&shared.url) => result,
        };

        match connected {
            Ok(transport) => {
                match run_session(&shared, transport, &cancel).await {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Closed { code, reason } => {
                        info!(code, reason = %reason, "connection closed");
                        if shared.close_state().is_some() && !shared.is_manual() {
                            shared.emit(
                                &EventKind::Disconnect,
                                &json!({ "code": code, "reason": reason }),
                            );
                        }
                    }
                }
            }
            Err(err) => {
                warn!(url = %shared.url, error = %err, "connection attempt failed");
                let _ = shared.close_state();
                shared.emit_error(&err);
                if !err.is_retryable() {
                    warn!(url = %shared.url, category = err.category(), "not retrying connect");
                    return;
                }
            }
        }

        if cancel.is_cancelled() || shared.is_manual() || !shared.config.auto_reconnect {
            return;
        }

        let attempt = shared.attempts.load(Ordering::SeqCst);
        if !shared.config.allows_attempt(attempt) {
            warn!(attempts = attempt, "giving up on reconnection");
            shared.emit(
                &EventKind::MaxReconnectAttempts,
                &json!({ "attempts": attempt }),
            );
            return;
        }

        let delay = backoff.delay(attempt);
        if !shared.advance(&cancel, ConnectionState::Reconnecting) {
            return;
        }
        let _ = shared.attempts.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("stream_reconnects_total").increment(1);
        info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "reconnecting");
        shared.emit(
            &EventKind::Reconnecting,
            &json!({ "attempt": attempt + 1, "delayMs": delay.as_millis() as u64 }),
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_session(
    shared: &Shared,
    transport: Transport,
    cancel: &CancellationToken,
) -> SessionEnd {
    let Transport {
        mut sink,
        mut stream,
    } = transport;
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    *shared.outbound.lock() = Some(tx.clone());

    let end = if shared.advance(cancel, ConnectionState::Open) {
        let previous_attempts = shared.attempts.swap(0, Ordering::SeqCst);
        info!(url = %shared.url, "connected");
        shared.emit(&EventKind::Connected, &json!({ "url": shared.url }));
        if previous_attempts > 0 {
            shared.emit(
                &EventKind::Reconnected,
                &json!({ "attempts": previous_attempts }),
            );
        }

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                    break SessionEnd::Cancelled;
                }
                Some(text) = rx.recv() => {
                    if let Err(err) = sink.send(text).await {
                        warn!(error = %err, "send failed");
                        shared.emit_error(&err);
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => shared.route(&text),
                    Some(Ok(Frame::Close { code, reason })) => {
                        let _ = shared.advance(cancel, ConnectionState::Closing);
                        break SessionEnd::Closed { code, reason };
                    }
                    // Only the close transition drives reconnection.
                    Some(Err(err)) => {
                        warn!(error = %err, "transport error");
                        shared.emit_error(&err);
                    }
                    None => break SessionEnd::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: "connection lost".into(),
                    },
                }
            }
        }
    } else {
        debug!(url = %shared.url, "disconnected while the handshake completed");
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
        SessionEnd::Cancelled
    };

    // A restarted driver may already have installed its own sender.
    let mut outbound = shared.outbound.lock();
    if outbound.as_ref().is_some_and(|current| current.same_channel(&tx)) {
        *outbound = None;
    }
    end
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
