use crate::core::errors::KristError;
use crate::core::kernel::codec::WsCodec;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, instrument, warn};

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000, // 10 seconds
        }
    }
}

/// WebSocket session trait - pure transport layer
#[async_trait]
pub trait WsSession<C: WsCodec>: Send {
    /// Connect to the WebSocket
    async fn connect(&mut self) -> Result<(), KristError>;

    /// Send a raw message
    async fn send_raw(&mut self, msg: Message) -> Result<(), KristError>;

    /// Encode a request with the codec and send it
    async fn send_request(&mut self, id: u64, request: &C::Request) -> Result<(), KristError>;

    /// Receive the next raw data message
    ///
    /// `None` means the connection is gone; a close frame is returned once as
    /// `Some(Ok(Message::Close(_)))` before that.
    async fn next_raw(&mut self) -> Option<Result<Message, KristError>>;

    /// Get the next decoded message
    async fn next_message(&mut self) -> Option<Result<C::Message, KristError>>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), KristError>;
}

/// Creates unconnected sessions for one-time URLs
///
/// Every connection attempt gets a fresh URL, so the connection manager needs
/// a way to build a new session per attempt rather than a single long-lived one.
pub trait WsSessionFactory<C: WsCodec>: Send + Sync + 'static {
    type Session: WsSession<C> + 'static;

    fn create(&self, url: &str) -> Self::Session;
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Tungstenite-based WebSocket implementation
pub struct TungsteniteWs<C: WsCodec> {
    url: String,
    write: Option<futures_util::stream::SplitSink<WsStream, Message>>,
    read: Option<futures_util::stream::SplitStream<WsStream>>,
    connected: bool,
    codec: Arc<C>,
    config: WsConfig,
}

impl<C: WsCodec> TungsteniteWs<C> {
    /// Create a new WebSocket session with the specified codec
    ///
    /// # Arguments
    /// * `url` - The WebSocket URL to connect to
    /// * `codec` - The codec to handle message encoding/decoding
    pub fn new(url: String, codec: Arc<C>) -> Self {
        Self {
            url,
            write: None,
            read: None,
            connected: false,
            codec,
            config: WsConfig::default(),
        }
    }

    /// Set custom WebSocket configuration
    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl<C: WsCodec> WsSession<C> for TungsteniteWs<C> {
    // the URL carries a one-time token, keep it out of spans
    #[instrument(skip(self))]
    async fn connect(&mut self) -> Result<(), KristError> {
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let (ws_stream, _) = tokio::time::timeout(connect_timeout, connect_async(&self.url))
            .await
            .map_err(|_| KristError::ConnectionTimeout("WebSocket connection timeout".to_string()))?
            .map_err(|e| KristError::NetworkError(format!("WebSocket connection failed: {}", e)))?;

        let (write, read) = ws_stream.split();
        self.write = Some(write);
        self.read = Some(read);
        self.connected = true;

        Ok(())
    }

    #[instrument(skip(self, msg))]
    async fn send_raw(&mut self, msg: Message) -> Result<(), KristError> {
        if !self.connected {
            return Err(KristError::NotConnected);
        }

        let write = self.write.as_mut().ok_or_else(|| {
            KristError::NetworkError("WebSocket write stream not available".to_string())
        })?;

        write.send(msg).await.map_err(|e| {
            self.connected = false;
            KristError::NetworkError(format!("Failed to send WebSocket message: {}", e))
        })?;

        Ok(())
    }

    async fn send_request(&mut self, id: u64, request: &C::Request) -> Result<(), KristError> {
        let message = self.codec.encode_request(id, request)?;
        self.send_raw(message).await
    }

    async fn next_raw(&mut self) -> Option<Result<Message, KristError>> {
        loop {
            if !self.connected {
                return None;
            }

            let read = self.read.as_mut()?;

            match read.next().await {
                Some(Ok(message)) => match message {
                    Message::Close(_) => {
                        self.connected = false;
                        return Some(Ok(message));
                    }
                    Message::Ping(data) => {
                        // Auto-respond to pings at transport level
                        if let Err(e) = self.send_raw(Message::Pong(data)).await {
                            warn!("Failed to send pong response: {}", e);
                        }
                    }
                    Message::Pong(_) | Message::Frame(_) => {}
                    _ => return Some(Ok(message)),
                },
                Some(Err(e)) => {
                    self.connected = false;
                    return Some(Err(KristError::NetworkError(format!(
                        "WebSocket error: {}",
                        e
                    ))));
                }
                None => {
                    self.connected = false;
                    return None;
                }
            }
        }
    }

    async fn next_message(&mut self) -> Option<Result<C::Message, KristError>> {
        loop {
            match self.next_raw().await {
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by peer");
                    return None;
                }
                Some(Ok(raw_msg)) => match self.codec.decode_message(raw_msg) {
                    Ok(Some(decoded)) => return Some(Ok(decoded)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                },
                Some(Err(e)) => return Some(Err(e)),
                None => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<(), KristError> {
        if let Some(write) = self.write.as_mut() {
            let _ = write.send(Message::Close(None)).await;
        }
        self.connected = false;
        self.write = None;
        self.read = None;
        Ok(())
    }
}

/// Factory producing `TungsteniteWs` sessions sharing one codec
pub struct TungsteniteFactory<C: WsCodec> {
    codec: Arc<C>,
    config: WsConfig,
}

impl<C: WsCodec> TungsteniteFactory<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec: Arc::new(codec),
            config: WsConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }
}

impl<C: WsCodec> WsSessionFactory<C> for TungsteniteFactory<C> {
    type Session = TungsteniteWs<C>;

    fn create(&self, url: &str) -> Self::Session {
        TungsteniteWs::new(url.to_string(), Arc::clone(&self.codec)).with_config(self.config.clone())
    }
}
