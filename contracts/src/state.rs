//! # Identity Keyspace and Lifecycle
//!
//! Every record belonging to an identity lives under a single encoded
//! prefix:
//!
//! ```text
//! namespace ‖ len(id) ‖ id                    → state byte
//! namespace ‖ len(id) ‖ id ‖ tag              → field record / list head
//! namespace ‖ len(id) ‖ id ‖ tag ‖ sub-key    → list node
//! ```
//!
//! The length prefix keeps one identity's keyspace from being a prefix of
//! another's. The lifecycle is `Unregistered → Active → Revoked`, with
//! `Revoked` terminal.

use sovid_protocol::config::{IDENTITY_NAMESPACE, MAX_IDENTITY_LENGTH, STATE_ACTIVE, STATE_REVOKED};
use sovid_protocol::host::NativeContext;

use crate::error::{display_id, IdentityError, IdentityResult, StorageContext};

// ---------------------------------------------------------------------------
// IdentityKey
// ---------------------------------------------------------------------------

/// An identity together with its encoded storage prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey {
    id: Vec<u8>,
    encoded: Vec<u8>,
}

impl IdentityKey {
    /// Encode an identity. Fails for empty or over-long identities.
    pub fn new(id: &[u8]) -> IdentityResult<Self> {
        if id.is_empty() || id.len() > MAX_IDENTITY_LENGTH {
            return Err(IdentityError::ValidationFailed(format!(
                "identity length {} outside 1..={MAX_IDENTITY_LENGTH}",
                id.len()
            )));
        }
        let mut encoded = Vec::with_capacity(IDENTITY_NAMESPACE.len() + 1 + id.len());
        encoded.extend_from_slice(IDENTITY_NAMESPACE);
        encoded.push(id.len() as u8);
        encoded.extend_from_slice(id);
        Ok(Self {
            id: id.to_vec(),
            encoded,
        })
    }

    /// The raw identity bytes.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Human-readable form for errors and logs.
    pub fn display(&self) -> String {
        display_id(&self.id)
    }

    /// Hex form used in event payloads.
    pub fn hex(&self) -> String {
        hex::encode(&self.id)
    }

    /// The encoded prefix; also the key of the state byte.
    pub fn as_bytes(&self) -> &[u8] {
        &self.encoded
    }

    /// Storage key of one of this identity's fields.
    pub fn field(&self, tag: u8) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.encoded.len() + 1);
        key.extend_from_slice(&self.encoded);
        key.push(tag);
        key
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum IdentityState {
    Unregistered,
    Active,
    Revoked,
}

impl std::fmt::Display for IdentityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityState::Unregistered => write!(f, "Unregistered"),
            IdentityState::Active => write!(f, "Active"),
            IdentityState::Revoked => write!(f, "Revoked"),
        }
    }
}

/// Read the lifecycle state of an identity.
pub fn state(ctx: &NativeContext<'_>, id: &IdentityKey) -> IdentityResult<IdentityState> {
    let raw = ctx.get(id.as_bytes()).during("read identity state")?;
    match raw.as_deref() {
        None => Ok(IdentityState::Unregistered),
        Some([STATE_ACTIVE]) => Ok(IdentityState::Active),
        Some([STATE_REVOKED]) => Ok(IdentityState::Revoked),
        Some(other) => Err(IdentityError::ValidationFailed(format!(
            "corrupt state record for {}: {}",
            id.display(),
            hex::encode(other)
        ))),
    }
}

/// Record a lifecycle transition. `Unregistered` is never written.
pub(crate) fn set_state(
    ctx: &mut NativeContext<'_>,
    id: &IdentityKey,
    state: IdentityState,
) -> IdentityResult<()> {
    let byte = match state {
        IdentityState::Active => STATE_ACTIVE,
        IdentityState::Revoked => STATE_REVOKED,
        IdentityState::Unregistered => {
            return Err(IdentityError::ValidationFailed(
                "cannot transition back to Unregistered".into(),
            ))
        }
    };
    ctx.put(id.as_bytes(), &[byte]).during("write identity state")
}

/// Fail unless the identity is `Active`.
pub fn require_active(ctx: &NativeContext<'_>, id: &IdentityKey) -> IdentityResult<()> {
    match state(ctx, id)? {
        IdentityState::Active => Ok(()),
        IdentityState::Unregistered => Err(IdentityError::NotRegistered(id.display())),
        IdentityState::Revoked => Err(IdentityError::AlreadyRevoked(id.display())),
    }
}
