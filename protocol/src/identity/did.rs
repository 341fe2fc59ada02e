//! # Decentralized Identifiers
//!
//! Every identity managed by the registry is a DID string of the form
//!
//! ```text
//! did:<method>:<base58check(version ‖ ripemd160(sha256(sha256(nonce))))>
//! ```
//!
//! The checksum suffix is the first four bytes of `sha256(sha256(payload))`,
//! so the method-specific part always decodes to 25 bytes: one version byte,
//! twenty hash bytes, four checksum bytes.
//!
//! Identifiers are minted off-ledger from a random nonce. The ledger never
//! sees the nonce; it only checks that a submitted string is well-formed
//! before accepting it as a registration target.

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{
    ADDRESS_HASH_LENGTH, ADDRESS_VERSION, CHECKSUM_LENGTH, DID_NONCE_LENGTH, MAX_IDENTITY_LENGTH,
};
use crate::crypto::hash::{checksum, double_sha256, ripemd160};

/// Decoded length of the method-specific identifier.
const DECODED_LENGTH: usize = 1 + ADDRESS_HASH_LENGTH + CHECKSUM_LENGTH;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing a DID.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DidError {
    /// The string does not match `did:<method>:<identifier>`.
    #[error("invalid DID format: {0}")]
    InvalidFormat(String),

    /// The method segment is not the one this registry serves.
    #[error("unsupported DID method: expected '{expected}', got '{found}'")]
    UnsupportedMethod { expected: String, found: String },

    /// The identifier is not valid base58.
    #[error("invalid base58 identifier: {0}")]
    InvalidEncoding(String),

    /// The identifier decodes to the wrong number of bytes.
    #[error("identifier decodes to {0} bytes, expected {DECODED_LENGTH}")]
    InvalidLength(usize),

    /// The version byte does not match.
    #[error("unexpected version byte {found:#04x}, expected {expected:#04x}")]
    InvalidVersion { expected: u8, found: u8 },

    /// The checksum suffix does not match the payload.
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

// ---------------------------------------------------------------------------
// Did
// ---------------------------------------------------------------------------

/// A validated DID string.
///
/// # Examples
///
/// ```
/// use sovid_protocol::identity::Did;
///
/// let did = Did::from_nonce("sov", b"some nonce");
/// let parsed = Did::parse(did.as_str(), "sov").unwrap();
/// assert_eq!(did, parsed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Derive the DID for a given nonce. Deterministic.
    pub fn from_nonce(method: &str, nonce: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(DECODED_LENGTH);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(&ripemd160(&double_sha256(nonce)));
        let check = checksum(&payload);
        payload.extend_from_slice(&check);
        Self(format!(
            "did:{}:{}",
            method,
            bs58::encode(payload).into_string()
        ))
    }

    /// Mint a fresh DID from a random 32-byte nonce.
    pub fn generate(method: &str) -> Self {
        let mut nonce = [0u8; DID_NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);
        Self::from_nonce(method, &nonce)
    }

    /// Parse and verify a DID string for the given method.
    pub fn parse(did: &str, method: &str) -> Result<Self, DidError> {
        if did.len() > MAX_IDENTITY_LENGTH {
            return Err(DidError::InvalidFormat(format!(
                "longer than {MAX_IDENTITY_LENGTH} bytes"
            )));
        }

        let parts: Vec<&str> = did.splitn(3, ':').collect();
        if parts.len() != 3 {
            return Err(DidError::InvalidFormat(
                "DID must have format 'did:<method>:<identifier>'".into(),
            ));
        }
        if parts[0] != "did" {
            return Err(DidError::InvalidFormat(format!(
                "expected 'did' prefix, got '{}'",
                parts[0]
            )));
        }
        if parts[1] != method {
            return Err(DidError::UnsupportedMethod {
                expected: method.to_string(),
                found: parts[1].to_string(),
            });
        }

        let decoded = bs58::decode(parts[2])
            .into_vec()
            .map_err(|e| DidError::InvalidEncoding(e.to_string()))?;
        if decoded.len() != DECODED_LENGTH {
            return Err(DidError::InvalidLength(decoded.len()));
        }
        if decoded[0] != ADDRESS_VERSION {
            return Err(DidError::InvalidVersion {
                expected: ADDRESS_VERSION,
                found: decoded[0],
            });
        }
        let (payload, check) = decoded.split_at(1 + ADDRESS_HASH_LENGTH);
        if checksum(payload) != check {
            return Err(DidError::ChecksumMismatch);
        }

        Ok(Self(did.to_string()))
    }

    /// Parse raw identity bytes as they arrive in a call.
    pub fn parse_bytes(bytes: &[u8], method: &str) -> Result<Self, DidError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|_| DidError::InvalidFormat("identity is not valid UTF-8".into()))?;
        Self::parse(s, method)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The method segment.
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<[u8]> for Did {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
