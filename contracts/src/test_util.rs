//! Shared fixtures for unit tests.

use sovid_protocol::crypto::Keypair;
use sovid_protocol::host::{Event, NativeContext, SignedAddresses};
use sovid_protocol::identity::Did;
use sovid_protocol::storage::MemoryStore;

use crate::registry::IdentityRegistry;

/// In-memory host: store, witness set and event log.
pub struct Harness {
    pub store: MemoryStore,
    pub witness: SignedAddresses,
    pub events: Vec<Event>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            witness: SignedAddresses::new(),
            events: Vec::new(),
        }
    }

    pub fn ctx(&mut self) -> NativeContext<'_> {
        NativeContext::new(&mut self.store, &self.witness, &mut self.events)
    }

    /// Replace the witness set with the signatures of `keys`.
    pub fn sign_with(&mut self, keys: &[&Keypair]) {
        self.witness = SignedAddresses::new();
        for kp in keys {
            self.witness.insert(kp.address());
        }
    }

    /// Register a fresh identity owned by a fresh key; leaves the witness
    /// empty afterwards.
    pub fn register(&mut self, registry: &IdentityRegistry) -> (Did, Keypair) {
        let did = Did::generate(registry.config().did_method.as_str());
        let kp = Keypair::generate();
        self.sign_with(&[&kp]);
        registry
            .register(&mut self.ctx(), did.as_bytes(), &kp.public_key_bytes())
            .expect("registration should succeed");
        self.sign_with(&[]);
        (did, kp)
    }
}
