//! # Key Registry
//!
//! Each identity owns an ordered list of public keys. Keys are addressed by
//! a per-identity index that starts at 1 and only ever grows: the counter
//! survives revocation, so an index once issued is never handed out again.
//!
//! Removal is a soft revoke. The node stays in the list with its `revoked`
//! flag set, and a revoked index fails every later authorization.
//!
//! ## Access levels
//!
//! | Level                 | Authenticate | Mutate |
//! |-----------------------|--------------|--------|
//! | `All`                 | yes          | yes    |
//! | `AuthenticationOnly`  | yes          | no     |
//! | `Both`                | yes          | yes    |

use serde::Serialize;
use sovid_protocol::codec::{Sink, Source};
use sovid_protocol::config::{
    ACCESS_ALL, ACCESS_AUTHENTICATION_ONLY, ACCESS_BOTH, FIELD_KEY_COUNTER, FIELD_PUBLIC_KEYS,
    MAX_PUBLIC_KEY_SIZE,
};
use sovid_protocol::crypto::Address;
use sovid_protocol::host::NativeContext;

use crate::error::{IdentityError, IdentityResult, StorageContext};
use crate::linked_list::LinkedList;
use crate::state::{require_active, IdentityKey};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a key is allowed to authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyAccess {
    All,
    AuthenticationOnly,
    Both,
}

/// The kind of check a key is being presented for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    /// Proving who the caller is, with no state change.
    Authentication,
    /// Authorizing a state-mutating call.
    Mutation,
}

impl KeyAccess {
    pub fn code(self) -> u8 {
        match self {
            KeyAccess::All => ACCESS_ALL,
            KeyAccess::AuthenticationOnly => ACCESS_AUTHENTICATION_ONLY,
            KeyAccess::Both => ACCESS_BOTH,
        }
    }

    pub fn from_code(code: u64) -> IdentityResult<Self> {
        match u8::try_from(code) {
            Ok(ACCESS_ALL) => Ok(KeyAccess::All),
            Ok(ACCESS_AUTHENTICATION_ONLY) => Ok(KeyAccess::AuthenticationOnly),
            Ok(ACCESS_BOTH) => Ok(KeyAccess::Both),
            _ => Err(IdentityError::ValidationFailed(format!(
                "unknown key access code {code}"
            ))),
        }
    }

    pub fn permits(self, usage: KeyUsage) -> bool {
        match (self, usage) {
            (_, KeyUsage::Authentication) => true,
            (KeyAccess::AuthenticationOnly, KeyUsage::Mutation) => false,
            (KeyAccess::All | KeyAccess::Both, KeyUsage::Mutation) => true,
        }
    }
}

/// One entry of an identity's key list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicKeyEntry {
    pub index: u32,
    #[serde(serialize_with = "crate::document::as_hex")]
    pub key: Vec<u8>,
    pub revoked: bool,
    pub access: KeyAccess,
}

impl PublicKeyEntry {
    fn encode_payload(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        sink.write_var_bytes(&self.key)
            .write_bool(self.revoked)
            .write_u8(self.access.code());
        sink.into_bytes()
    }

    fn decode(index: u32, payload: &[u8]) -> IdentityResult<Self> {
        let mut src = Source::new(payload);
        let key = src.read_var_bytes()?.to_vec();
        let revoked = src.read_bool()?;
        let access = KeyAccess::from_code(u64::from(src.read_u8()?))?;
        src.finish()?;
        Ok(Self {
            index,
            key,
            revoked,
            access,
        })
    }

    /// The witness address of this key.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.key)
    }
}

// ---------------------------------------------------------------------------
// Storage helpers
// ---------------------------------------------------------------------------

fn key_list(id: &IdentityKey) -> LinkedList {
    LinkedList::new(id.field(FIELD_PUBLIC_KEYS))
}

fn item_key(index: u32) -> [u8; 4] {
    index.to_be_bytes()
}

fn parse_item_key(item: &[u8]) -> IdentityResult<u32> {
    let bytes: [u8; 4] = item
        .try_into()
        .map_err(|_| IdentityError::ValidationFailed("corrupt key index".into()))?;
    Ok(u32::from_be_bytes(bytes))
}

fn last_index(ctx: &NativeContext<'_>, id: &IdentityKey) -> IdentityResult<u32> {
    match ctx
        .get(&id.field(FIELD_KEY_COUNTER))
        .during("read key counter")?
    {
        None => Ok(0),
        Some(bytes) => parse_item_key(&bytes),
    }
}

/// Check a raw key's size.
pub fn validate_raw_key(raw_key: &[u8]) -> IdentityResult<()> {
    if raw_key.is_empty() || raw_key.len() > MAX_PUBLIC_KEY_SIZE {
        return Err(IdentityError::ValidationFailed(format!(
            "public key length {} outside 1..={MAX_PUBLIC_KEY_SIZE}",
            raw_key.len()
        )));
    }
    Ok(())
}

/// Convert a decoded varuint to a key index.
pub fn to_index(value: u64) -> IdentityResult<u32> {
    u32::try_from(value)
        .map_err(|_| IdentityError::ValidationFailed(format!("key index {value} out of range")))
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Append a key to an active identity. Returns the new index.
pub fn add_key(
    ctx: &mut NativeContext<'_>,
    id: &IdentityKey,
    raw_key: &[u8],
    access: KeyAccess,
) -> IdentityResult<u32> {
    require_active(ctx, id)?;
    validate_raw_key(raw_key)?;
    match find_key_by_bytes(ctx, id, raw_key) {
        Ok(_) => {
            return Err(IdentityError::DuplicateEntry(format!(
                "public key {} already belongs to {}",
                hex::encode(raw_key),
                id.display()
            )))
        }
        Err(IdentityError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let index = last_index(ctx, id)?
        .checked_add(1)
        .ok_or_else(|| IdentityError::ValidationFailed("key index space exhausted".into()))?;
    let entry = PublicKeyEntry {
        index,
        key: raw_key.to_vec(),
        revoked: false,
        access,
    };
    key_list(id).insert(ctx, &item_key(index), &entry.encode_payload())?;
    ctx.put(&id.field(FIELD_KEY_COUNTER), &item_key(index))
        .during("write key counter")?;
    tracing::debug!(did = %id.display(), index, "public key added");
    Ok(index)
}

/// Fetch a key by index.
pub fn get_key(
    ctx: &NativeContext<'_>,
    id: &IdentityKey,
    index: u32,
) -> IdentityResult<PublicKeyEntry> {
    match key_list(id).find(ctx, &item_key(index))? {
        Some(node) => PublicKeyEntry::decode(index, &node.payload),
        None => Err(IdentityError::NotFound(format!(
            "key #{index} of {}",
            id.display()
        ))),
    }
}

/// Soft-revoke a key. Returns the entry as it was before revocation.
pub fn revoke_key(
    ctx: &mut NativeContext<'_>,
    id: &IdentityKey,
    index: u32,
) -> IdentityResult<PublicKeyEntry> {
    require_active(ctx, id)?;
    let mut entry = get_key(ctx, id, index)?;
    if entry.revoked {
        return Err(IdentityError::ValidationFailed(format!(
            "key #{index} of {} is already revoked",
            id.display()
        )));
    }
    entry.revoked = true;
    key_list(id).update(ctx, &item_key(index), &entry.encode_payload())?;
    tracing::debug!(did = %id.display(), index, "public key revoked");
    entry.revoked = false;
    Ok(entry)
}

/// Change the access level of a live key.
pub fn set_access(
    ctx: &mut NativeContext<'_>,
    id: &IdentityKey,
    index: u32,
    access: KeyAccess,
) -> IdentityResult<()> {
    let mut entry = get_key(ctx, id, index)?;
    if entry.revoked {
        return Err(IdentityError::ValidationFailed(format!(
            "key #{index} of {} is revoked",
            id.display()
        )));
    }
    entry.access = access;
    key_list(id).update(ctx, &item_key(index), &entry.encode_payload())
}

/// Linear scan for a raw key, revoked or not.
pub fn find_key_by_bytes(
    ctx: &NativeContext<'_>,
    id: &IdentityKey,
    raw_key: &[u8],
) -> IdentityResult<u32> {
    for node in key_list(id).iter(ctx) {
        let (item, payload) = node?;
        let index = parse_item_key(&item)?;
        if PublicKeyEntry::decode(index, &payload)?.key == raw_key {
            return Ok(index);
        }
    }
    Err(IdentityError::NotFound(format!(
        "public key {} of {}",
        hex::encode(raw_key),
        id.display()
    )))
}

/// All keys, revoked included, in index order.
pub fn list_keys(ctx: &NativeContext<'_>, id: &IdentityKey) -> IdentityResult<Vec<PublicKeyEntry>> {
    let mut keys = key_list(id)
        .iter(ctx)
        .map(|node| {
            let (item, payload) = node?;
            PublicKeyEntry::decode(parse_item_key(&item)?, &payload)
        })
        .collect::<IdentityResult<Vec<_>>>()?;
    keys.sort_by_key(|k| k.index);
    Ok(keys)
}

/// Whether the identity holds at least one non-revoked key.
pub fn has_live_key(ctx: &NativeContext<'_>, id: &IdentityKey) -> IdentityResult<bool> {
    for node in key_list(id).iter(ctx) {
        let (item, payload) = node?;
        if !PublicKeyEntry::decode(parse_item_key(&item)?, &payload)?.revoked {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Drop every key record, including the counter.
pub(crate) fn clear_keys(ctx: &mut NativeContext<'_>, id: &IdentityKey) -> IdentityResult<()> {
    key_list(id).clear(ctx)?;
    ctx.delete(&id.field(FIELD_KEY_COUNTER))
        .during("clear key counter")
}

/// Prove that the caller holds key `index` of `id` for the given usage.
pub fn check_witness_by_index(
    ctx: &NativeContext<'_>,
    id: &IdentityKey,
    index: u32,
    usage: KeyUsage,
) -> IdentityResult<()> {
    let entry = get_key(ctx, id, index).map_err(|e| match e {
        IdentityError::NotFound(what) => {
            IdentityError::AuthorizationFailed(format!("unknown {what}"))
        }
        other => other,
    })?;
    if entry.revoked {
        return Err(IdentityError::AuthorizationFailed(format!(
            "key #{index} of {} is revoked",
            id.display()
        )));
    }
    if !entry.access.permits(usage) {
        return Err(IdentityError::AuthorizationFailed(format!(
            "key #{index} of {} is authentication-only",
            id.display()
        )));
    }
    if !ctx.check_witness(&entry.address()) {
        tracing::warn!(did = %id.display(), index, "witness check failed");
        return Err(IdentityError::AuthorizationFailed(format!(
            "no witness for key #{index} of {}",
            id.display()
        )));
    }
    Ok(())
}
