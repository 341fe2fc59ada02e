//! # Host Interfaces
//!
//! What a native contract needs from the transaction-execution host, and
//! nothing more:
//!
//! 1. a key-value store scoped to the current call ([`KvStore`]),
//! 2. a witness oracle answering "did this call's signer hold the key
//!    behind this address" ([`Witness`]),
//! 3. somewhere to emit events ([`EventSink`]).
//!
//! [`NativeContext`] bundles the three and is passed by reference into
//! every contract operation. There is no global state.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::crypto::Address;
use crate::storage::{KvStore, StorageResult};

// ---------------------------------------------------------------------------
// Witness
// ---------------------------------------------------------------------------

/// The witness oracle.
pub trait Witness {
    fn check_witness(&self, address: &Address) -> bool;
}

/// The set of addresses that signed the current transaction.
#[derive(Debug, Default, Clone)]
pub struct SignedAddresses {
    addresses: HashSet<Address>,
}

impl SignedAddresses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the witness set from the raw public keys that signed.
    pub fn from_public_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        Self {
            addresses: keys
                .into_iter()
                .map(|k| Address::from_public_key(k.as_ref()))
                .collect(),
        }
    }

    pub fn insert(&mut self, address: Address) {
        self.addresses.insert(address);
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl Witness for SignedAddresses {
    fn check_witness(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A notification emitted by a contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event name, e.g. `KeyAdded`.
    pub name: String,
    /// Event payload, already rendered as strings (identities and keys are
    /// hex-encoded by the emitter).
    pub fields: Vec<String>,
}

impl Event {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

/// Fire-and-forget event sink.
pub trait EventSink {
    fn notify(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn notify(&mut self, event: Event) {
        self.push(event);
    }
}

// ---------------------------------------------------------------------------
// NativeContext
// ---------------------------------------------------------------------------

/// Everything one contract call can touch.
pub struct NativeContext<'a> {
    store: &'a mut dyn KvStore,
    witness: &'a dyn Witness,
    events: &'a mut dyn EventSink,
}

impl<'a> NativeContext<'a> {
    pub fn new(
        store: &'a mut dyn KvStore,
        witness: &'a dyn Witness,
        events: &'a mut dyn EventSink,
    ) -> Self {
        Self {
            store,
            witness,
            events,
        }
    }

    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.store.get(key)
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.store.put(key, value)
    }

    pub fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        self.store.delete(key)
    }

    pub fn check_witness(&self, address: &Address) -> bool {
        self.witness.check_witness(address)
    }

    pub fn notify(&mut self, event: Event) {
        self.events.notify(event);
    }
}
