use crate::core::config::{duration_millis, Credentials, KristConfig};
use crate::core::errors::KristError;
use crate::core::kernel::{
    RateLimiter, ReqwestRest, RestClientBuilder, RestClientConfig, TungsteniteFactory, WsConfig,
    WsSessionFactory,
};
use crate::core::traits::WsStarter;
use crate::krist::client::KristWsClient;
use crate::krist::codec::KristCodec;
use crate::krist::rest::KristRest;
use crate::krist::wallet::WalletFormat;

/// Create the typed REST collaborator for the configured sync node
pub fn build_rest(config: &KristConfig) -> Result<KristRest<ReqwestRest>, KristError> {
    let rest_config = RestClientConfig::new(config.sync_node.clone())
        .with_timeout(config.connect_timeout.as_secs().max(1));
    let rest = RestClientBuilder::new(rest_config).build()?;
    Ok(KristRest::new(rest))
}

/// Create the shared request budget described by the configuration
pub fn build_rate_limiter(config: &KristConfig) -> Result<RateLimiter, KristError> {
    RateLimiter::new(config.rate_limit_requests, config.rate_limit_window)
}

/// Create a client with its own rate limiter
pub fn build_client(config: KristConfig) -> Result<KristWsClient, KristError> {
    let limiter = build_rate_limiter(&config)?;
    build_client_with_limiter(config, limiter)
}

/// Create a client sharing `limiter` with every other client built from it
pub fn build_client_with_limiter(
    config: KristConfig,
    limiter: RateLimiter,
) -> Result<KristWsClient, KristError> {
    let rest = build_rest(&config)?;
    let ws_config = WsConfig {
        connect_timeout_ms: duration_millis(config.connect_timeout),
    };
    let factory = TungsteniteFactory::new(KristCodec::new()).with_config(ws_config);
    build_client_with(config, limiter, factory, rest)
}

/// Create a client on a custom transport and `/ws/start` collaborator
pub fn build_client_with<F, S>(
    config: KristConfig,
    limiter: RateLimiter,
    factory: F,
    starter: S,
) -> Result<KristWsClient, KristError>
where
    F: WsSessionFactory<KristCodec>,
    S: WsStarter,
{
    config.validate()?;
    // fail on an unknown wallet format now rather than on first connect
    if let Credentials::Wallet { format, .. } = &config.credentials {
        format.parse::<WalletFormat>()?;
    }
    Ok(KristWsClient::spawn(factory, starter, &config, limiter))
}
