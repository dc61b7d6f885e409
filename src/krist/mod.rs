pub mod address;
pub mod builder;
pub mod client;
pub mod codec;
mod connection;
pub mod correlator;
pub mod dispatcher;
pub mod hash;
pub mod rest;
pub mod subscriptions;
pub mod types;
pub mod wallet;

// Re-export main types for easier importing
pub use address::{derive_address, derive_address_with, is_valid_address};
pub use builder::{
    build_client, build_client_with, build_client_with_limiter, build_rate_limiter, build_rest,
};
pub use client::KristWsClient;
pub use codec::{KristCodec, KristEvent, KristWsMessage};
pub use dispatcher::WsEvent;
pub use hash::Sha256Hex;
pub use rest::KristRest;
pub use types::{
    Block, KristAddress, KristRequest, MeResponse, Name, Response, ServerStatus, Transaction,
    TransactionType,
};
pub use wallet::{derive_key, WalletFormat};
