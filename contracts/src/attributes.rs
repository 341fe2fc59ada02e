//! # Attribute Registry
//!
//! Typed key/value claims attached to an identity, stored as a linked list
//! keyed by the attribute key. Re-adding an existing key deletes the old
//! node and inserts a fresh one, so the updated attribute moves to the
//! newest position (front of enumeration). Indexers rely on that order for
//! "last updated" views, so it is not normalized.

use sovid_protocol::codec::{Sink, Source};
use sovid_protocol::config::{
    FIELD_ATTRIBUTES, MAX_ATTRIBUTE_KEY_SIZE, MAX_ATTRIBUTE_TYPE_SIZE, MAX_ATTRIBUTE_VALUE_SIZE,
};
use sovid_protocol::host::NativeContext;

use crate::error::{IdentityError, IdentityResult};
use crate::linked_list::{LinkedList, LinkedListIter};
use crate::state::IdentityKey;

/// A single attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: Vec<u8>,
    pub value_type: Vec<u8>,
    pub value: Vec<u8>,
}

impl Attribute {
    pub fn new(
        key: impl Into<Vec<u8>>,
        value_type: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key: key.into(),
            value_type: value_type.into(),
            value: value.into(),
        }
    }

    /// Enforce size limits.
    pub fn validate(&self) -> IdentityResult<()> {
        if self.key.is_empty() || self.key.len() > MAX_ATTRIBUTE_KEY_SIZE {
            return Err(IdentityError::ValidationFailed(format!(
                "attribute key length {} outside 1..={MAX_ATTRIBUTE_KEY_SIZE}",
                self.key.len()
            )));
        }
        if self.value_type.len() > MAX_ATTRIBUTE_TYPE_SIZE {
            return Err(IdentityError::ValidationFailed(format!(
                "attribute type length {} exceeds {MAX_ATTRIBUTE_TYPE_SIZE}",
                self.value_type.len()
            )));
        }
        if self.value.len() > MAX_ATTRIBUTE_VALUE_SIZE {
            return Err(IdentityError::ValidationFailed(format!(
                "attribute value length {} exceeds {MAX_ATTRIBUTE_VALUE_SIZE}",
                self.value.len()
            )));
        }
        Ok(())
    }

    /// Wire form: `varbytes(key) ‖ varbytes(type) ‖ varbytes(value)`.
    pub fn encode(&self, sink: &mut Sink) {
        sink.write_var_bytes(&self.key)
            .write_var_bytes(&self.value_type)
            .write_var_bytes(&self.value);
    }

    pub fn decode(src: &mut Source<'_>) -> IdentityResult<Self> {
        let key = src.read_var_bytes()?.to_vec();
        let value_type = src.read_var_bytes()?.to_vec();
        let value = src.read_var_bytes()?.to_vec();
        Ok(Self {
            key,
            value_type,
            value,
        })
    }

    /// Batch wire form: `varuint(n) ‖ n × attribute`.
    pub fn encode_batch(attributes: &[Attribute], sink: &mut Sink) {
        sink.write_var_uint(attributes.len() as u64);
        for attr in attributes {
            attr.encode(sink);
        }
    }

    pub fn decode_batch(src: &mut Source<'_>) -> IdentityResult<Vec<Attribute>> {
        let count = src.read_var_uint()?;
        // Each attribute needs at least three length bytes.
        if count > (src.remaining() / 3) as u64 {
            return Err(IdentityError::ValidationFailed(format!(
                "attribute count {count} exceeds input"
            )));
        }
        (0..count).map(|_| Attribute::decode(src)).collect()
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        sink.write_var_bytes(&self.value_type)
            .write_var_bytes(&self.value);
        sink.into_bytes()
    }

    fn decode_payload(key: Vec<u8>, payload: &[u8]) -> IdentityResult<Self> {
        let mut src = Source::new(payload);
        let value_type = src.read_var_bytes()?.to_vec();
        let value = src.read_var_bytes()?.to_vec();
        src.finish()?;
        Ok(Self {
            key,
            value_type,
            value,
        })
    }
}

fn attribute_list(id: &IdentityKey) -> LinkedList {
    LinkedList::new(id.field(FIELD_ATTRIBUTES))
}

/// Insert or replace an attribute. Returns `true` when an older value was
/// replaced.
pub fn upsert(
    ctx: &mut NativeContext<'_>,
    id: &IdentityKey,
    attribute: &Attribute,
) -> IdentityResult<bool> {
    attribute.validate()?;
    let list = attribute_list(id);
    let replaced = list.delete(ctx, &attribute.key)?;
    list.insert(ctx, &attribute.key, &attribute.encode_payload())?;
    tracing::debug!(
        did = %id.display(),
        key = %hex::encode(&attribute.key),
        replaced,
        "attribute upserted"
    );
    Ok(replaced)
}

/// Remove an attribute. Returns whether it existed.
pub fn remove(ctx: &mut NativeContext<'_>, id: &IdentityKey, key: &[u8]) -> IdentityResult<bool> {
    attribute_list(id).delete(ctx, key)
}

/// Look up a single attribute.
pub fn get(
    ctx: &NativeContext<'_>,
    id: &IdentityKey,
    key: &[u8],
) -> IdentityResult<Option<Attribute>> {
    match attribute_list(id).find(ctx, key)? {
        Some(node) => Attribute::decode_payload(key.to_vec(), &node.payload).map(Some),
        None => Ok(None),
    }
}

/// Lazily enumerate attributes, newest first.
pub fn list<'c, 'a>(ctx: &'c NativeContext<'a>, id: &IdentityKey) -> AttributeIter<'c, 'a> {
    AttributeIter {
        inner: attribute_list(id).iter(ctx),
    }
}

pub(crate) fn clear(ctx: &mut NativeContext<'_>, id: &IdentityKey) -> IdentityResult<usize> {
    attribute_list(id).clear(ctx)
}

/// Iterator returned by [`list`].
pub struct AttributeIter<'c, 'a> {
    inner: LinkedListIter<'c, 'a>,
}

impl Iterator for AttributeIter<'_, '_> {
    type Item = IdentityResult<Attribute>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|node| node.and_then(|(key, payload)| Attribute::decode_payload(key, &payload)))
    }
}
