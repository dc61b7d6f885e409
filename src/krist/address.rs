//! Private key → address derivation (v2 addresses).
//!
//! An address is a one-character prefix followed by nine characters from
//! `[a-z0-9]`. The nine characters come from nine hash "slots" that are
//! picked in a hash-driven order; when the order points at a slot that was
//! already used, the chain is re-hashed and the same position retried.

use crate::core::{errors::KristError, traits::HashFn};
use crate::krist::hash::{double_hash, Sha256Hex};
use tracing::trace;

pub const ADDRESS_LENGTH: usize = 10;
const SLOTS: usize = 9;
const MAX_REHASHES: usize = 10_000;

/// Derive the address for a private key with SHA-256
pub fn derive_address(private_key: &str, prefix: &str) -> Result<String, KristError> {
    derive_address_with(&Sha256Hex, private_key, prefix)
}

/// Derive the address for a private key with the given hash capability
pub fn derive_address_with<H: HashFn + ?Sized>(
    hasher: &H,
    private_key: &str,
    prefix: &str,
) -> Result<String, KristError> {
    if private_key.is_empty() {
        return Err(KristError::InvalidArgument(
            "Private key cannot be empty".to_string(),
        ));
    }
    if prefix.len() != 1 {
        return Err(KristError::InvalidArgument(format!(
            "Address prefix must be a single ASCII character, got '{}'",
            prefix
        )));
    }

    let mut slots: [Option<u8>; SLOTS] = [None; SLOTS];
    let mut hash = double_hash(hasher, private_key);
    for slot in &mut slots {
        *slot = Some(hex_byte(&hash, 0)?);
        hash = double_hash(hasher, &hash);
    }

    let mut address = String::with_capacity(ADDRESS_LENGTH);
    address.push_str(prefix);

    let mut i = 0;
    let mut rehashes = 0;
    while i < SLOTS {
        let index = usize::from(hex_byte(&hash, 2 * i)?) % SLOTS;
        match slots[index].take() {
            Some(value) => {
                address.push(byte_to_char(value));
                i += 1;
            }
            None => {
                rehashes += 1;
                if rehashes > MAX_REHASHES {
                    return Err(KristError::Internal(
                        "Address derivation did not converge".to_string(),
                    ));
                }
                hash = hasher.hash(&hash);
            }
        }
    }

    trace!(rehashes, "derived address");
    Ok(address)
}

/// Parse the two hex characters at `offset`
fn hex_byte(hash: &str, offset: usize) -> Result<u8, KristError> {
    hash.get(offset..offset + 2)
        .and_then(|pair| u8::from_str_radix(pair, 16).ok())
        .ok_or_else(|| {
            KristError::Internal(format!(
                "Hash output is not hex of sufficient length at offset {}",
                offset
            ))
        })
}

/// Map a byte onto `[0-9a-z]`, folding the overflow onto 'e'
fn byte_to_char(value: u8) -> char {
    let byte = 48 + value / 7;
    let code = if byte + 39 > 122 {
        101
    } else if byte > 57 {
        byte + 39
    } else {
        byte
    };
    char::from(code)
}

/// Whether `address` has the shape of a v2 address with the given prefix
pub fn is_valid_address(address: &str, prefix: &str) -> bool {
    address.len() == ADDRESS_LENGTH
        && address.starts_with(prefix)
        && address[prefix.len()..]
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}
