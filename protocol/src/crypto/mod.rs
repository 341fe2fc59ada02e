//! # Cryptographic Primitives
//!
//! Hashing for identity strings and witness addresses, plus Ed25519 key
//! material for the reference host.
//!
//! Everything here is a thin wrapper around audited RustCrypto and dalek
//! implementations. No primitive is implemented by hand.

pub mod address;
pub mod hash;
pub mod keys;

pub use address::Address;
pub use hash::{checksum, double_sha256, hash160, ripemd160, sha256};
pub use keys::{KeyError, Keypair};
