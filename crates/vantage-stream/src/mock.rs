//! Channel-backed connector for driver tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::{FutureExt, SinkExt, StreamExt};
use futures::channel::mpsc as fmpsc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::errors::StreamError;
use crate::transport::{Connector, Frame, Transport};

/// Server end of one mocked connection.
pub(crate) struct MockServer {
    inbound: fmpsc::UnboundedSender<Result<Frame, StreamError>>,
    outbound: fmpsc::UnboundedReceiver<String>,
}

impl MockServer {
    /// Push a text frame to the client.
    pub(crate) fn push(&self, text: &str) {
        let _ = self.inbound.unbounded_send(Ok(Frame::Text(text.to_owned())));
    }

    /// Push a transport error to the client.
    pub(crate) fn fail(&self, message: &str) {
        let _ = self
            .inbound
            .unbounded_send(Err(StreamError::Transport(message.to_owned())));
    }

    /// Close with the given code.
    pub(crate) fn close(&self, code: u16, reason: &str) {
        let _ = self.inbound.unbounded_send(Ok(Frame::Close {
            code,
            reason: reason.to_owned(),
        }));
    }

    /// Next text the client sent, if any is buffered.
    pub(crate) fn try_received(&mut self) -> Option<String> {
        self.outbound.next().now_or_never().flatten()
    }
}

/// Records connection attempts and hands each new connection to the test.
pub(crate) struct MockConnector {
    servers: mpsc::UnboundedSender<MockServer>,
    attempts: Mutex<Vec<Instant>>,
    failures_left: AtomicU32,
}

impl MockConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        Self::failing(0)
    }

    /// Refuse the first `failures` connection attempts.
    pub(crate) fn failing(failures: u32) -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            servers: tx,
            attempts: Mutex::new(Vec::new()),
            failures_left: AtomicU32::new(failures),
        });
        (connector, rx)
    }

    pub(crate) fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    pub(crate) fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Transport, StreamError> {
        self.attempts.lock().push(Instant::now());
        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(StreamError::Transport("connection refused".into()));
        }

        let (inbound_tx, inbound_rx) = fmpsc::unbounded();
        let (outbound_tx, outbound_rx) = fmpsc::unbounded::<String>();
        let _ = self.servers.send(MockServer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        });
        Ok(Transport {
            sink: Box::pin(outbound_tx.sink_map_err(|e| StreamError::Transport(e.to_string()))),
            stream: Box::pin(inbound_rx),
        })
    }
}
