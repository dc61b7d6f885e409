use crate::core::traits::HashFn;
use sha2::{Digest, Sha256};

/// SHA-256 as lowercase hex, the hash the Krist network uses everywhere
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hex;

impl HashFn for Sha256Hex {
    fn hash(&self, input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }
}

/// `H(H(input))`
pub fn double_hash<H: HashFn + ?Sized>(hasher: &H, input: &str) -> String {
    hasher.hash(&hasher.hash(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            Sha256Hex.hash("a"),
            "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb"
        );
    }

    #[test]
    fn test_double_hash_hashes_the_hex_digest() {
        let once = Sha256Hex.hash("a");
        assert_eq!(double_hash(&Sha256Hex, "a"), Sha256Hex.hash(&once));
    }

    #[test]
    fn test_closures_are_hash_functions() {
        let reverse = |s: &str| s.chars().rev().collect::<String>();
        assert_eq!(double_hash(&reverse, "abc"), "abc");
    }
}
