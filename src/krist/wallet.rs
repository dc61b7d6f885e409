//! Wallet formats: deterministic password → private key transforms.

use crate::core::{config::Credentials, errors::KristError, traits::HashFn, types::PrivateKey};
use crate::krist::hash::Sha256Hex;
use secrecy::ExposeSecret;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

const JWALELSET_ROUNDS: usize = 17;

/// The fixed set of wallet formats understood by Krist wallets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletFormat {
    /// `H("KRISTWALLET" + password) + "-000"`
    KristWallet,
    /// `H("KRISTWALLETEXTENSION" + H(H(username) + "^" + H(password))) + "-000"`
    KristWalletUsernameAppendHashes,
    /// `H(H(username) + "^" + H(password))`
    KristWalletUsername,
    /// `H` applied 17 times to the password
    Jwalelset,
    /// The password is the private key
    Api,
}

impl WalletFormat {
    pub const ALL: [Self; 5] = [
        Self::KristWallet,
        Self::KristWalletUsernameAppendHashes,
        Self::KristWalletUsername,
        Self::Jwalelset,
        Self::Api,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::KristWallet => "kristwallet",
            Self::KristWalletUsernameAppendHashes => "kristwallet_username_appendhashes",
            Self::KristWalletUsername => "kristwallet_username",
            Self::Jwalelset => "jwalelset",
            Self::Api => "api",
        }
    }

    /// Whether the transform takes a username as well as a password
    pub const fn needs_username(&self) -> bool {
        matches!(
            self,
            Self::KristWalletUsernameAppendHashes | Self::KristWalletUsername
        )
    }

    /// Derive a private key using SHA-256
    pub fn derive_key(
        &self,
        password: &str,
        username: Option<&str>,
    ) -> Result<PrivateKey, KristError> {
        self.derive_key_with(&Sha256Hex, password, username)
    }

    /// Derive a private key using the given hash capability
    pub fn derive_key_with<H: HashFn + ?Sized>(
        &self,
        hasher: &H,
        password: &str,
        username: Option<&str>,
    ) -> Result<PrivateKey, KristError> {
        if password.is_empty() {
            return Err(KristError::InvalidArgument(
                "Password cannot be empty".to_string(),
            ));
        }
        if username == Some("") {
            return Err(KristError::InvalidArgument(
                "Username cannot be empty when supplied".to_string(),
            ));
        }

        let key = match self {
            Self::KristWallet => format!("{}-000", hasher.hash(&format!("KRISTWALLET{}", password))),
            Self::KristWalletUsernameAppendHashes => {
                let inner = username_hash(hasher, password, username);
                format!(
                    "{}-000",
                    hasher.hash(&format!("KRISTWALLETEXTENSION{}", inner.as_str()))
                )
            }
            Self::KristWalletUsername => username_hash(hasher, password, username).to_string(),
            Self::Jwalelset => {
                let mut digest = Zeroizing::new(password.to_string());
                for _ in 0..JWALELSET_ROUNDS {
                    digest = Zeroizing::new(hasher.hash(&digest));
                }
                digest.to_string()
            }
            Self::Api => password.to_string(),
        };

        Ok(PrivateKey::new(key))
    }
}

/// `H(H(username) + "^" + H(password))`, a missing username hashing as ""
fn username_hash<H: HashFn + ?Sized>(
    hasher: &H,
    password: &str,
    username: Option<&str>,
) -> Zeroizing<String> {
    let user = hasher.hash(username.unwrap_or(""));
    let pass = Zeroizing::new(hasher.hash(password));
    let joined = Zeroizing::new(format!("{}^{}", user, pass.as_str()));
    Zeroizing::new(hasher.hash(&joined))
}

impl fmt::Display for WalletFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletFormat {
    type Err = KristError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| KristError::InvalidFormat(s.to_string()))
    }
}

/// Derive a private key from a format name, a password and an optional username
pub fn derive_key(
    format: &str,
    password: &str,
    username: Option<&str>,
) -> Result<PrivateKey, KristError> {
    format.parse::<WalletFormat>()?.derive_key(password, username)
}

/// The private key a set of credentials stands for; `None` for a guest
pub fn resolve_credentials(credentials: &Credentials) -> Result<Option<PrivateKey>, KristError> {
    match credentials {
        Credentials::Guest => Ok(None),
        Credentials::PrivateKey(key) => Ok(Some(key.clone())),
        Credentials::Wallet {
            format,
            password,
            username,
        } => derive_key(format, password.expose_secret(), username.as_deref()).map(Some),
    }
}
