/// Transport kernel shared by the protocol client
///
/// The kernel holds everything that is not Krist-specific: the HTTP client,
/// the WebSocket session and its factory, the codec seam, the shared rate
/// limiter and the reconnect backoff.
///
/// # Components
///
/// - `RestClient` / `ReqwestRest`: JSON over HTTP with typed error bodies
/// - `WsSession` / `TungsteniteWs`: one WebSocket connection, frames in and out
/// - `WsSessionFactory`: builds a fresh session per one-time URL
/// - `WsCodec`: protocol-specific encoding and decoding
/// - `RateLimiter`: request budget shared across clients
/// - `Backoff`: doubling reconnect delay with a cap
///
/// # Example
/// ```rust,no_run
/// use kristlink::core::kernel::*;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let rest = RestClientBuilder::new(RestClientConfig::new("https://krist.dev".to_string()))
///     .build()?;
/// let motd: serde_json::Value = rest.get_json("/motd", &[]).await?;
/// println!("{}", motd["motd"]);
/// # Ok(())
/// # }
/// ```
pub mod backoff;
pub mod codec;
pub mod rate_limit;
pub mod rest;
pub mod ws;

pub use backoff::Backoff;
pub use codec::WsCodec;
pub use rate_limit::RateLimiter;
pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use ws::{TungsteniteFactory, TungsteniteWs, WsConfig, WsSession, WsSessionFactory};
