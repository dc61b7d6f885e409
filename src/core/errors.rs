use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KristError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API error: {code} - {message}")]
    ApiError { code: i32, message: String },

    /// A reply from the Krist server with `ok: false`
    #[error("Server error: {code}{}", message_suffix(.message))]
    Server {
        code: ServerErrorCode,
        message: Option<String>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid wallet format: {0}")]
    InvalidFormat(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed before a response was received")]
    ConnectionClosed,

    #[error("Client has been closed")]
    ClientClosed,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" - {}", m))
        .unwrap_or_default()
}

impl KristError {
    /// Build a server error from the `error` and `message` fields of a reply
    pub fn server(code: &str, message: Option<String>) -> Self {
        Self::Server {
            code: ServerErrorCode::from_code(code),
            message,
        }
    }

    /// The server error code, if this error came from an `ok: false` reply
    pub fn server_code(&self) -> Option<&ServerErrorCode> {
        match self {
            Self::Server { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Error codes the Krist server reports in the `error` field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerErrorCode {
    AddressNotFound,
    NameNotFound,
    InsufficientFunds,
    InvalidParameter,
    MissingParameter,
    AuthFailed,
    TransactionsDisabled,
    RateLimitHit,
    NameTaken,
    NotNameOwner,
    BlockNotFound,
    TransactionNotFound,
    InvalidWebsocketToken,
    DatabaseError,
    Unknown(String),
}

impl ServerErrorCode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "address_not_found" => Self::AddressNotFound,
            "name_not_found" => Self::NameNotFound,
            "insufficient_funds" => Self::InsufficientFunds,
            "invalid_parameter" => Self::InvalidParameter,
            "missing_parameter" => Self::MissingParameter,
            "auth_failed" => Self::AuthFailed,
            "transactions_disabled" => Self::TransactionsDisabled,
            "rate_limit_hit" => Self::RateLimitHit,
            "name_taken" => Self::NameTaken,
            "not_name_owner" => Self::NotNameOwner,
            "block_not_found" => Self::BlockNotFound,
            "transaction_not_found" => Self::TransactionNotFound,
            "invalid_websocket_token" => Self::InvalidWebsocketToken,
            "database_error" => Self::DatabaseError,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::AddressNotFound => "address_not_found",
            Self::NameNotFound => "name_not_found",
            Self::InsufficientFunds => "insufficient_funds",
            Self::InvalidParameter => "invalid_parameter",
            Self::MissingParameter => "missing_parameter",
            Self::AuthFailed => "auth_failed",
            Self::TransactionsDisabled => "transactions_disabled",
            Self::RateLimitHit => "rate_limit_hit",
            Self::NameTaken => "name_taken",
            Self::NotNameOwner => "not_name_owner",
            Self::BlockNotFound => "block_not_found",
            Self::TransactionNotFound => "transaction_not_found",
            Self::InvalidWebsocketToken => "invalid_websocket_token",
            Self::DatabaseError => "database_error",
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ServerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
