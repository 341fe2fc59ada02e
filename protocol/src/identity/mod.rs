//! # Identity Module
//!
//! The identifier format shared by the ledger contract and off-ledger
//! tooling. Keys, attributes and authorization live in `sovid-contracts`;
//! this module only knows how to mint and verify `did:<method>:` strings.

pub mod did;

pub use did::{Did, DidError};
