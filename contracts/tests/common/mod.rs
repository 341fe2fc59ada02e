//! Shared host fixture for integration tests.
//!
//! Every call runs against a fresh [`Overlay`]: writes and events are kept
//! only when the call returns `Ok`, matching how a ledger host treats a
//! transaction.

#![allow(dead_code)]

use sovid_contracts::{IdentityConfig, IdentityRegistry, IdentityResult, SignerPolicy};
use sovid_protocol::codec::Sink;
use sovid_protocol::crypto::Keypair;
use sovid_protocol::host::{Event, NativeContext, SignedAddresses};
use sovid_protocol::identity::Did;
use sovid_protocol::storage::{KvStore, MemoryStore, Overlay};

pub struct Host {
    pub registry: IdentityRegistry,
    pub store: MemoryStore,
    pub witness: SignedAddresses,
    pub events: Vec<Event>,
}

impl Host {
    pub fn new() -> Self {
        Self::with_policy(SignerPolicy::Shared)
    }

    pub fn with_policy(signer_policy: SignerPolicy) -> Self {
        Self {
            registry: IdentityRegistry::new(IdentityConfig {
                signer_policy,
                ..IdentityConfig::default()
            }),
            store: MemoryStore::new(),
            witness: SignedAddresses::new(),
            events: Vec::new(),
        }
    }

    /// The next call is signed by exactly these keys.
    pub fn sign_with(&mut self, keys: &[&Keypair]) {
        self.witness = SignedAddresses::from_public_keys(keys.iter().map(|k| k.public_key_bytes()));
    }

    /// Run one call through an overlay; commit only on success.
    pub fn call<T>(
        &mut self,
        f: impl FnOnce(&IdentityRegistry, &mut NativeContext<'_>) -> IdentityResult<T>,
    ) -> IdentityResult<T> {
        let mut overlay = Overlay::new(&self.store);
        let mut emitted: Vec<Event> = Vec::new();
        let result = {
            let mut ctx = NativeContext::new(&mut overlay, &self.witness, &mut emitted);
            f(&self.registry, &mut ctx)
        };
        match result {
            Ok(value) => {
                let changes = overlay.into_changes();
                self.store.apply(changes).expect("memory store apply");
                self.events.extend(emitted);
                Ok(value)
            }
            Err(e) => {
                overlay.discard();
                Err(e)
            }
        }
    }

    /// Run a raw request through the dispatcher.
    pub fn invoke(&mut self, method: &str, input: &[u8]) -> IdentityResult<Vec<u8>> {
        self.call(|registry, ctx| registry.invoke(ctx, method, input))
    }

    /// Register a fresh identity owned by a fresh key.
    pub fn register(&mut self) -> (Did, Keypair) {
        let did = Did::generate(&self.registry.config().did_method);
        let kp = Keypair::generate();
        self.sign_with(&[&kp]);
        let pk = kp.public_key_bytes();
        self.call(|r, ctx| r.register(ctx, did.as_bytes(), &pk))
            .expect("registration should succeed");
        self.sign_with(&[]);
        (did, kp)
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.name.as_str()).collect()
    }
}

/// Build a request from a closure over a [`Sink`].
pub fn request(build: impl FnOnce(&mut Sink)) -> Vec<u8> {
    let mut sink = Sink::new();
    build(&mut sink);
    sink.into_bytes()
}
