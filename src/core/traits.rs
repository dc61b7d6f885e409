use crate::core::{errors::KristError, types::PrivateKey};
use async_trait::async_trait;

/// Mints one-time WebSocket URLs
///
/// The WebSocket endpoint is not fixed: every connection attempt exchanges
/// the (optional) private key for a fresh URL that is valid for one connect.
#[async_trait]
pub trait WsStarter: Send + Sync + 'static {
    /// Exchange a private key (or none, for a guest) for a WebSocket URL
    async fn start_ws(&self, private_key: Option<&PrivateKey>) -> Result<String, KristError>;
}

/// A string hash function rendered as lowercase hex
///
/// Wallet formats and address derivation are defined in terms of this
/// capability so tests and alternative deployments can swap it out.
pub trait HashFn: Send + Sync {
    fn hash(&self, input: &str) -> String;
}

impl<F> HashFn for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn hash(&self, input: &str) -> String {
        self(input)
    }
}
