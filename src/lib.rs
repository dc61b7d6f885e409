pub mod core;
pub mod krist;

pub use crate::core::{
    config::{ConfigError, Credentials, KristConfig},
    errors::{KristError, ServerErrorCode},
    kernel::RateLimiter,
    traits::{HashFn, WsStarter},
    types::*,
};
pub use crate::krist::{
    build_client, build_client_with, build_client_with_limiter, derive_address, derive_key,
    KristWsClient, WalletFormat, WsEvent,
};
