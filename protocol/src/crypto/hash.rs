//! # Hashing Utilities
//!
//! The hash functions behind identity strings and witness addresses:
//!
//! - **SHA-256** and its doubled form, used for the DID payload and the
//!   base58check checksum.
//! - **RIPEMD-160**, used to compress a 32-byte digest into the 20-byte
//!   payload of identities and addresses.
//!
//! `hash160` is the usual `RIPEMD-160(SHA-256(x))` composition.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use sovid_protocol::crypto::sha256;
///
/// let hash = sha256(b"sovid");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the double-SHA-256 hash: `SHA-256(SHA-256(data))`.
///
/// Used both for hashing the DID nonce and for the base58check checksum.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Compute the RIPEMD-160 hash of the input data.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `RIPEMD-160(SHA-256(data))`. The address derivation for raw public keys.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

/// First four bytes of `double_sha256(payload)`.
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = double_sha256(payload);
    [digest[0], digest[1], digest[2], digest[3]]
}
