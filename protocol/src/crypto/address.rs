//! # Witness Addresses
//!
//! The host proves "the signer of this call held key K" by checking a
//! 20-byte address derived from K, never the key itself. Every raw public
//! key stored by the identity contract is mapped through
//! [`Address::from_public_key`] before the witness oracle is consulted.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::hash::hash160;

/// A 20-byte address: `RIPEMD-160(SHA-256(raw_public_key))`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    /// Derive the address of a raw public key.
    pub fn from_public_key(raw_key: &[u8]) -> Self {
        Self(hash160(raw_key))
    }

    /// Wrap 20 raw address bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = Address::from_public_key(b"key-one");
        let b = Address::from_public_key(b"key-one");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_keys_give_distinct_addresses() {
        assert_ne!(
            Address::from_public_key(b"key-one"),
            Address::from_public_key(b"key-two")
        );
    }

    #[test]
    fn hex_is_forty_chars() {
        assert_eq!(Address::from_public_key(b"k").to_hex().len(), 40);
    }
}
