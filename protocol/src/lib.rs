// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # sovid Protocol — Core Library
//!
//! Primitives shared by the sovid identity contract and its hosts. This
//! crate knows what an identifier looks like, how bytes are framed on the
//! wire, and what a host must provide to run a contract call. It does not
//! know what a key registry or a threshold group is; that lives in
//! `sovid-contracts`.
//!
//! ## Architecture
//!
//! - **config** — Format constants, storage field tags and size limits.
//! - **crypto** — SHA-256 / RIPEMD-160 hashing, witness addresses, Ed25519
//!   keypairs.
//! - **identity** — `did:<method>:<base58check>` minting and verification.
//! - **codec** — varint / varbytes / varuint framing (`Sink`, `Source`).
//! - **storage** — `KvStore` trait, in-memory and sled backends, per-call
//!   overlay.
//! - **host** — witness oracle, event sink and the `NativeContext` handed to
//!   every call.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod host;
pub mod identity;
pub mod storage;
