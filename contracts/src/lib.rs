//! # sovid Identity Contract
//!
//! The ledger-hosted identity engine. An identity is a `did:sov:` string
//! that owns:
//!
//! - **Public keys** — an indexed, soft-revocable key list with per-key
//!   access levels.
//! - **Attributes** — typed key/value claims.
//! - **A controller** — another identity or a threshold group that may
//!   act on the identity's behalf.
//! - **A recovery group** — a threshold group that can replace lost keys.
//! - **Services and contexts** — endpoints and JSON-LD contexts published
//!   in the identity's document.
//!
//! Every operation takes a [`NativeContext`](sovid_protocol::host::NativeContext)
//! supplying storage, the witness oracle and the event sink. Operations
//! either succeed completely or return the first error; the host drops the
//! call's overlay on error.
//!
//! ## Design Principles
//!
//! 1. Lifecycle states are explicit: `Unregistered → Active → Revoked`.
//! 2. Every privileged call names the key or signers that authorize it and
//!    is checked against the witness oracle.
//! 3. Lists live on a flat key-value store as singly linked lists; nothing
//!    is held in memory between calls.

pub mod attributes;
pub mod contexts;
pub mod controller;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod group;
pub mod keys;
pub mod linked_list;
pub mod recovery;
pub mod registry;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_util;

pub use attributes::Attribute;
pub use controller::{Controller, ControllerAuth};
pub use document::{Document, KeyState, ServiceView};
pub use error::{IdentityError, IdentityResult};
pub use group::{Group, Member, Signer, SignerPolicy};
pub use keys::{KeyAccess, KeyUsage, PublicKeyEntry};
pub use registry::{IdentityConfig, IdentityRegistry};
pub use services::Service;
pub use state::{IdentityKey, IdentityState};
