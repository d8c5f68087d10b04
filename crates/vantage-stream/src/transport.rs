//! Transport seam between the connection driver and the wire.
//!
//! The driver only sees text frames and close notifications. The default
//! [`TungsteniteConnector`] speaks WebSocket via `tokio-tungstenite`; tests
//! plug in channel-backed connectors.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::{Error as WsError, UrlError};
use tracing::trace;

use crate::errors::StreamError;

/// Close code reported when the transport ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported when a close frame carried no status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Inbound frame as seen by the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 payload.
    Text(String),
    /// Peer closed the connection.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Outbound half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = StreamError> + Send>>;
/// Inbound half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, StreamError>> + Send>>;

/// An established connection.
pub struct Transport {
    /// Text frames to the server.
    pub sink: FrameSink,
    /// Frames from the server. Ending without a close frame is an abnormal closure.
    pub stream: FrameStream,
}

/// Opens connections to a stream address.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url`.
    async fn connect(&self, url: &str) -> Result<Transport, StreamError>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Transport, StreamError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| connect_error(url, e))?;
        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(|e| StreamError::Transport(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, StreamError>(Message::Text(text.into()))));

        let stream = read.filter_map(|message| future::ready(decode(message)));

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn decode(
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<Frame, StreamError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(Frame::Text(text))),
            Err(e) => Some(Err(StreamError::Parse(format!("binary frame is not UTF-8: {e}")))),
        },
        Ok(Message::Close(frame)) => Some(Ok(match frame {
            Some(frame) => Frame::Close {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_owned(),
            },
            None => Frame::Close {
                code: NO_STATUS_RECEIVED,
                reason: String::new(),
            },
        })),
        Ok(other) => {
            trace!(kind = ?other, "ignoring control frame");
            None
        }
        Err(e) => Some(Err(StreamError::Transport(e.to_string()))),
    }
}

/// Classify a handshake failure. An address the transport can never reach
/// is a configuration error; everything else may clear up on retry.
fn connect_error(url: &str, err: WsError) -> StreamError {
    match err {
        WsError::Url(UrlError::UnableToConnect(reason)) => StreamError::Transport(reason),
        WsError::Url(reason) => StreamError::InvalidUrl {
            url: url.to_owned(),
            reason: reason.to_string(),
        },
        other => StreamError::Transport(other.to_string()),
    }
}
