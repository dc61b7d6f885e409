use crate::core::types::{PrivateKey, SubscriptionLevel};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::env;
use std::time::Duration;

pub const DEFAULT_SYNC_NODE: &str = "https://krist.dev";
pub const DEFAULT_ADDRESS_PREFIX: &str = "k";

/// How the client authenticates its WebSocket connections
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    /// No private key; the server treats the connection as a guest
    #[default]
    Guest,
    /// A private key supplied directly by the caller
    PrivateKey(PrivateKey),
    /// A wallet password that is turned into a private key on first connect
    Wallet {
        format: String,
        password: Secret<String>,
        username: Option<String>,
    },
}

impl Credentials {
    pub fn private_key(key: impl Into<String>) -> Self {
        Self::PrivateKey(PrivateKey::new(key))
    }

    pub fn wallet(format: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Wallet {
            format: format.into(),
            password: Secret::new(password.into()),
            username: None,
        }
    }

    pub fn wallet_with_username(
        format: impl Into<String>,
        password: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self::Wallet {
            format: format.into(),
            password: Secret::new(password.into()),
            username: Some(username.into()),
        }
    }

    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::PrivateKey(_) => "private_key",
            Self::Wallet { .. } => "wallet",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KristConfig {
    pub sync_node: String,
    pub credentials: Credentials,
    pub address_prefix: String,
    pub subscriptions: BTreeSet<SubscriptionLevel>,
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
    pub connect_timeout: Duration,
}

impl Default for KristConfig {
    fn default() -> Self {
        Self {
            sync_node: DEFAULT_SYNC_NODE.to_string(),
            credentials: Credentials::Guest,
            address_prefix: DEFAULT_ADDRESS_PREFIX.to_string(),
            subscriptions: [SubscriptionLevel::Blocks, SubscriptionLevel::OwnTransactions]
                .into_iter()
                .collect(),
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(60),
            rate_limit_requests: 64,
            rate_limit_window: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

// Never expose secrets in serialization
impl Serialize for KristConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("KristConfig", 10)?;
        state.serialize_field("sync_node", &self.sync_node)?;
        state.serialize_field("credentials", self.credentials.kind())?;
        state.serialize_field(
            "secret",
            if self.credentials.is_guest() {
                ""
            } else {
                "[REDACTED]"
            },
        )?;
        state.serialize_field("address_prefix", &self.address_prefix)?;
        state.serialize_field("subscriptions", &self.subscriptions)?;
        state.serialize_field(
            "reconnect_initial_delay_ms",
            &duration_millis(self.reconnect_initial_delay),
        )?;
        state.serialize_field(
            "reconnect_max_delay_ms",
            &duration_millis(self.reconnect_max_delay),
        )?;
        state.serialize_field("rate_limit_requests", &self.rate_limit_requests)?;
        state.serialize_field(
            "rate_limit_window_ms",
            &duration_millis(self.rate_limit_window),
        )?;
        state.serialize_field("connect_timeout_ms", &duration_millis(self.connect_timeout))?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for KristConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct KristConfigHelper {
            sync_node: Option<String>,
            private_key: Option<String>,
            wallet_format: Option<String>,
            password: Option<String>,
            username: Option<String>,
            address_prefix: Option<String>,
            subscriptions: Option<BTreeSet<SubscriptionLevel>>,
            reconnect_initial_delay_ms: Option<u64>,
            reconnect_max_delay_ms: Option<u64>,
            rate_limit_requests: Option<u32>,
            rate_limit_window_ms: Option<u64>,
            connect_timeout_ms: Option<u64>,
        }

        let helper = KristConfigHelper::deserialize(deserializer)?;
        let defaults = Self::default();
        let credentials = credentials_from_parts(
            helper.private_key,
            helper.wallet_format,
            helper.password,
            helper.username,
        )
        .map_err(serde::de::Error::custom)?;

        Ok(Self {
            sync_node: helper.sync_node.unwrap_or(defaults.sync_node),
            credentials,
            address_prefix: helper.address_prefix.unwrap_or(defaults.address_prefix),
            subscriptions: helper.subscriptions.unwrap_or(defaults.subscriptions),
            reconnect_initial_delay: helper
                .reconnect_initial_delay_ms
                .map_or(defaults.reconnect_initial_delay, Duration::from_millis),
            reconnect_max_delay: helper
                .reconnect_max_delay_ms
                .map_or(defaults.reconnect_max_delay, Duration::from_millis),
            rate_limit_requests: helper
                .rate_limit_requests
                .unwrap_or(defaults.rate_limit_requests),
            rate_limit_window: helper
                .rate_limit_window_ms
                .map_or(defaults.rate_limit_window, Duration::from_millis),
            connect_timeout: helper
                .connect_timeout_ms
                .map_or(defaults.connect_timeout, Duration::from_millis),
        })
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn credentials_from_parts(
    private_key: Option<String>,
    wallet_format: Option<String>,
    password: Option<String>,
    username: Option<String>,
) -> Result<Credentials, ConfigError> {
    match (private_key, password) {
        (Some(_), Some(_)) => Err(ConfigError::InvalidConfiguration(
            "Both a private key and a wallet password were provided".to_string(),
        )),
        (Some(key), None) => Ok(Credentials::private_key(key)),
        (None, Some(password)) => Ok(Credentials::Wallet {
            format: wallet_format.unwrap_or_else(|| "kristwallet".to_string()),
            password: Secret::new(password),
            username,
        }),
        (None, None) => Ok(Credentials::Guest),
    }
}

impl KristConfig {
    /// Create a guest configuration against the default sync node
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - `{PREFIX}_SYNC_NODE` (e.g., `KRIST_SYNC_NODE`)
    /// - `{PREFIX}_PRIVATE_KEY`
    /// - `{PREFIX}_PASSWORD` and `{PREFIX}_WALLET_FORMAT` (defaults to `kristwallet`)
    /// - `{PREFIX}_USERNAME`
    ///
    /// Without a key or password the configuration is a guest one.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let var = |name: &str| env::var(format!("{}_{}", prefix, name)).ok();

        let credentials = credentials_from_parts(
            var("PRIVATE_KEY"),
            var("WALLET_FORMAT"),
            var("PASSWORD"),
            var("USERNAME"),
        )?;

        let mut config = Self {
            credentials,
            ..Self::default()
        };
        if let Some(sync_node) = var("SYNC_NODE") {
            config.sync_node = sync_node;
        }

        Ok(config)
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // no .env file, fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    #[must_use]
    pub fn sync_node(mut self, sync_node: impl Into<String>) -> Self {
        self.sync_node = sync_node.into();
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn address_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.address_prefix = prefix.into();
        self
    }

    /// Replace the desired subscription set
    #[must_use]
    pub fn subscriptions(mut self, levels: impl IntoIterator<Item = SubscriptionLevel>) -> Self {
        self.subscriptions = levels.into_iter().collect();
        self
    }

    #[must_use]
    pub const fn reconnect_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_initial_delay = initial;
        self.reconnect_max_delay = max;
        self
    }

    #[must_use]
    pub const fn rate_limit(mut self, requests: u32, window: Duration) -> Self {
        self.rate_limit_requests = requests;
        self.rate_limit_window = window;
        self
    }

    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Check the configuration for values the client cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_node.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "Sync node URL cannot be empty".to_string(),
            ));
        }
        if self.address_prefix.len() != 1 {
            return Err(ConfigError::InvalidConfiguration(format!(
                "Address prefix must be a single ASCII character, got '{}'",
                self.address_prefix
            )));
        }
        if self.reconnect_initial_delay.is_zero()
            || self.reconnect_max_delay < self.reconnect_initial_delay
        {
            return Err(ConfigError::InvalidConfiguration(
                "Reconnect delays must be non-zero with max >= initial".to_string(),
            ));
        }
        if self.rate_limit_requests == 0 || self.rate_limit_window.is_zero() {
            return Err(ConfigError::InvalidConfiguration(
                "Rate limit budget and window must be non-zero".to_string(),
            ));
        }
        if let Credentials::Wallet { password, .. } = &self.credentials {
            if password.expose_secret().is_empty() {
                return Err(ConfigError::InvalidConfiguration(
                    "Wallet password cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
