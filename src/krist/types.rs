use crate::core::types::{serialize_private_key, PrivateKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An address as the server reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KristAddress {
    pub address: String,
    pub balance: u64,
    #[serde(rename = "totalin")]
    pub total_in: u64,
    #[serde(rename = "totalout")]
    pub total_out: u64,
    #[serde(rename = "firstseen")]
    pub first_seen: DateTime<Utc>,
    /// Only present when names were requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub address: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub short_hash: Option<String>,
    pub value: u64,
    pub time: DateTime<Utc>,
    pub difficulty: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Mined,
    Transfer,
    NamePurchase,
    NameARecord,
    NameTransfer,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    /// `None` for mined transactions
    #[serde(default)]
    pub from: Option<String>,
    pub to: String,
    pub value: u64,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub sent_metaname: Option<String>,
    #[serde(default)]
    pub sent_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub original_owner: Option<String>,
    pub registered: DateTime<Utc>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transferred: Option<DateTime<Utc>>,
    #[serde(default)]
    pub a: Option<String>,
    #[serde(default)]
    pub unpaid: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub licence: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constants {
    pub wallet_version: u32,
    pub nonce_max_size: u32,
    pub name_cost: u64,
    pub min_work: u64,
    pub max_work: u64,
    pub work_factor: f64,
    pub seconds_per_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub address_prefix: String,
    pub name_suffix: String,
    pub currency_name: String,
    pub currency_symbol: String,
}

/// Server status snapshot: the `/motd` body and the `hello` handshake payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub server_time: DateTime<Utc>,
    pub motd: String,
    #[serde(default)]
    pub set: Option<DateTime<Utc>>,
    #[serde(default)]
    pub motd_set: Option<DateTime<Utc>>,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub public_ws_url: Option<String>,
    #[serde(default)]
    pub mining_enabled: bool,
    #[serde(default)]
    pub transactions_enabled: bool,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default)]
    pub work: Option<u64>,
    #[serde(default)]
    pub last_block: Option<Block>,
    #[serde(default)]
    pub package: Option<PackageInfo>,
    #[serde(default)]
    pub constants: Option<Constants>,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub notice: Option<String>,
}

/// Reply to `me` and `login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeResponse {
    #[serde(rename = "isGuest")]
    pub is_guest: bool,
    #[serde(default)]
    pub address: Option<KristAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressResponse {
    pub address: KristAddress,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionResponse {
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkResponse {
    pub work: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionLevelResponse {
    pub subscription_level: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidSubscriptionLevelsResponse {
    pub valid_subscription_levels: Vec<String>,
}

/// Reply to `POST /ws/start`
#[derive(Debug, Clone, Deserialize)]
pub struct WsStartResponse {
    pub url: String,
    #[serde(default)]
    pub expires: Option<u64>,
}

/// Reply to `POST /login`
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub authed: bool,
    #[serde(default)]
    pub address: Option<String>,
}

/// A request sent over the WebSocket; the codec adds the `id`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KristRequest {
    Me,
    Address {
        address: String,
        #[serde(rename = "fetchNames", skip_serializing_if = "Option::is_none")]
        fetch_names: Option<bool>,
    },
    Login {
        #[serde(serialize_with = "serialize_private_key")]
        privatekey: PrivateKey,
    },
    Logout,
    Subscribe {
        event: String,
    },
    Unsubscribe {
        event: String,
    },
    GetSubscriptionLevel,
    GetValidSubscriptionLevels,
    MakeTransaction {
        to: String,
        amount: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<String>,
    },
    Work,
}

impl KristRequest {
    /// The wire `type` of this request
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Me => "me",
            Self::Address { .. } => "address",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::GetSubscriptionLevel => "get_subscription_level",
            Self::GetValidSubscriptionLevels => "get_valid_subscription_levels",
            Self::MakeTransaction { .. } => "make_transaction",
            Self::Work => "work",
        }
    }
}

/// A correlated `ok: true` reply together with its full inbound object
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: u64,
    pub ok: bool,
    pub responding_to_type: Option<String>,
    pub body: Value,
}
