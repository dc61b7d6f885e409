use crate::core::errors::KristError;
use tokio_tungstenite::tungstenite::Message;

/// Codec trait for converting between typed protocol messages and raw WebSocket frames
///
/// The transport only moves frames; everything protocol-specific (the request
/// envelope, how an inbound frame is classified) lives in the codec.
pub trait WsCodec: Send + Sync + 'static {
    /// Outgoing request payload, without its correlation ID
    type Request: Send + Sync;

    /// The type representing parsed inbound messages
    type Message: Send + Sync;

    /// Encode a request tagged with the given correlation ID
    ///
    /// # Arguments
    /// * `id` - The correlation ID assigned to this request
    /// * `request` - The request payload
    fn encode_request(&self, id: u64, request: &Self::Request) -> Result<Message, KristError>;

    /// Decode a raw WebSocket message into a typed message
    ///
    /// Only data frames reach the codec; ping, pong and close are handled by
    /// the transport.
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Decoded message
    /// - `Ok(None)` - Frame ignored by the codec
    /// - `Err(error)` - Frame could not be decoded at all
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, KristError>;
}
