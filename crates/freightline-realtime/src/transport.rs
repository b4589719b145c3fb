//! Broker transport seam.
//!
//! The session drives a [`BrokerTransport`] and never touches sockets
//! directly, so tests can substitute a scripted link. The WebSocket
//! implementation carries the transport-owned automatic reconnect delay;
//! recovery from socket-level failure is governed here, not by the
//! session's bounded retry budget.

use crate::error::RealtimeError;
use crate::frame::Frame;
use async_trait::async_trait;
use freightline_core::config::RealtimeConfig;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// One live framed connection to the broker.
#[async_trait]
pub trait BrokerLink: Send {
    /// Send one frame.
    async fn send(&mut self, frame: Frame) -> Result<(), RealtimeError>;

    /// Receive the next frame. `None` means the connection closed cleanly.
    async fn next_frame(&mut self) -> Option<Result<Frame, RealtimeError>>;

    /// Close the connection. Errors on close are irrelevant.
    async fn close(&mut self);
}

/// Factory for broker connections.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Open a fresh connection to the broker endpoint.
    async fn connect(&self) -> Result<Box<dyn BrokerLink>, RealtimeError>;

    /// Automatic reconnect delay after a socket-level failure, if enabled.
    fn reconnect_delay(&self) -> Option<Duration>;
}

/// WebSocket transport speaking STOMP frames in text messages.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
    reconnect_delay: Option<Duration>,
}

impl WebSocketTransport {
    /// Build a transport for the configured broker endpoint.
    pub fn new(config: &RealtimeConfig) -> Result<Self, RealtimeError> {
        let url = Url::parse(&config.endpoint).map_err(|e| RealtimeError::Endpoint {
            url: config.endpoint.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            url,
            reconnect_delay: config.transport_reconnect_delay(),
        })
    }
}

#[async_trait]
impl BrokerTransport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn BrokerLink>, RealtimeError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        Ok(Box::new(WebSocketLink { stream }))
    }

    fn reconnect_delay(&self) -> Option<Duration> {
        self.reconnect_delay
    }
}

struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl BrokerLink for WebSocketLink {
    async fn send(&mut self, frame: Frame) -> Result<(), RealtimeError> {
        self.stream
            .send(Message::Text(frame.encode()))
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, RealtimeError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    // Bare newlines between frames are broker heart-beats.
                    if text
                        .trim_matches(|c| c == '\n' || c == '\r' || c == '\0')
                        .is_empty()
                    {
                        continue;
                    }
                    return Some(Frame::parse(&text));
                }
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Frame::parse(&text)),
                    Err(_) => {
                        return Some(Err(RealtimeError::Frame(
                            "non-UTF-8 binary frame".to_string(),
                        )))
                    }
                },
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(RealtimeError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
