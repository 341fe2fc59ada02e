//! End-to-end integration tests for the sovid protocol primitives.
//!
//! These tests compose the pieces a host needs to run one contract call:
//! DID minting and verification, request framing, witness derivation from
//! signing keys, and a per-call overlay committed to a sled database.
//!
//! Each test stands alone with its own temporary database.

use sovid_protocol::codec::{CodecError, Sink, Source};
use sovid_protocol::config::{DID_METHOD, IDENTITY_NAMESPACE};
use sovid_protocol::crypto::{Address, Keypair};
use sovid_protocol::host::{Event, NativeContext, SignedAddresses};
use sovid_protocol::identity::{Did, DidError};
use sovid_protocol::storage::{KvStore, MemoryStore, Overlay, SledStore};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Frames an `(id, key, index)` request the way a client would.
fn framed_request(did: &Did, key: &[u8], index: u64) -> Vec<u8> {
    let mut sink = Sink::new();
    sink.write_var_bytes(did.as_bytes())
        .write_var_bytes(key)
        .write_var_uint(index);
    sink.into_bytes()
}

fn storage_key(did: &Did, field: u8) -> Vec<u8> {
    let mut key = IDENTITY_NAMESPACE.to_vec();
    key.push(did.as_bytes().len() as u8);
    key.extend_from_slice(did.as_bytes());
    key.push(field);
    key
}

// ---------------------------------------------------------------------------
// Call lifecycle
// ---------------------------------------------------------------------------

#[test]
fn request_decodes_and_commits_through_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let did = Did::generate(DID_METHOD);
    let keypair = Keypair::generate();
    let request = framed_request(&did, &keypair.public_key_bytes(), 1);

    let mut store = SledStore::open(dir.path()).unwrap();
    let witness = SignedAddresses::from_public_keys([keypair.public_key_bytes()]);
    let mut events: Vec<Event> = Vec::new();

    let changes = {
        let mut overlay = Overlay::new(&store);
        let mut ctx = NativeContext::new(&mut overlay, &witness, &mut events);

        // Host side: decode the request, check the witness, write.
        let mut src = Source::new(&request);
        let id = src.read_var_bytes().unwrap();
        let key = src.read_var_bytes().unwrap();
        let index = src.read_var_uint().unwrap();
        src.finish().unwrap();

        let parsed = Did::parse_bytes(id, DID_METHOD).unwrap();
        assert_eq!(parsed, did);
        assert_eq!(index, 1);
        assert!(ctx.check_witness(&Address::from_public_key(key)));

        ctx.put(&storage_key(&parsed, 0x01), key).unwrap();
        ctx.notify(Event::new("Register", vec![hex::encode(id)]));
        overlay.into_changes()
    };

    // Nothing reached sled until the changes were applied.
    assert!(store.is_empty());
    store.apply(changes).unwrap();
    store.flush().unwrap();
    assert_eq!(
        store.get(&storage_key(&did, 0x01)).unwrap(),
        Some(keypair.public_key_bytes().to_vec())
    );
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].fields, vec![hex::encode(did.as_bytes())]);
}

#[test]
fn discarded_overlay_leaves_store_untouched() {
    let mut base = MemoryStore::new();
    base.put(b"k", b"committed").unwrap();

    let mut overlay = Overlay::new(&base);
    overlay.put(b"k", b"pending").unwrap();
    overlay.delete(b"other").unwrap();
    assert_eq!(overlay.get(b"k").unwrap(), Some(b"pending".to_vec()));
    assert!(overlay.is_dirty());
    overlay.discard();

    assert_eq!(base.get(b"k").unwrap(), Some(b"committed".to_vec()));
    assert_eq!(base.len(), 1);
}

#[test]
fn witness_only_covers_signing_keys() {
    let signer = Keypair::generate();
    let bystander = Keypair::generate();
    let witness = SignedAddresses::from_public_keys([signer.public_key_bytes()]);

    let mut store = MemoryStore::new();
    let mut events: Vec<Event> = Vec::new();
    let ctx = NativeContext::new(&mut store, &witness, &mut events);
    assert!(ctx.check_witness(&signer.address()));
    assert!(!ctx.check_witness(&bystander.address()));
}

// ---------------------------------------------------------------------------
// Malformed input
// ---------------------------------------------------------------------------

#[test]
fn truncated_request_is_rejected() {
    let did = Did::generate(DID_METHOD);
    let request = framed_request(&did, b"key", 1);
    let mut src = Source::new(&request[..request.len() - 3]);
    src.read_var_bytes().unwrap();
    assert!(matches!(
        src.read_var_bytes(),
        Err(CodecError::UnexpectedEof { .. })
    ));
}

#[test]
fn foreign_or_tampered_did_is_rejected() {
    let did = Did::generate(DID_METHOD);
    assert!(matches!(
        Did::parse(did.as_str(), "ont"),
        Err(DidError::UnsupportedMethod { .. })
    ));

    // Flip one base58 character of the identifier.
    let mut tampered = did.as_str().to_string();
    let last = tampered.pop().unwrap();
    tampered.push(if last == '2' { '3' } else { '2' });
    assert!(Did::parse(&tampered, DID_METHOD).is_err());
}
