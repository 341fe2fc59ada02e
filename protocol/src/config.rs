//! # Protocol Configuration & Constants
//!
//! Every magic number in sovid lives here. The storage layout constants in
//! particular are part of the on-ledger format: changing them after
//! identities exist orphans every record written under the old layout.

// ---------------------------------------------------------------------------
// Identity Format
// ---------------------------------------------------------------------------

/// Default DID method name. Identities look like `did:sov:<base58check>`.
pub const DID_METHOD: &str = "sov";

/// Version byte prepended to the hashed nonce before base58check encoding.
/// `0x17` makes every identifier start with `A`.
pub const ADDRESS_VERSION: u8 = 0x17;

/// Length of the hashed nonce (RIPEMD-160 output).
pub const ADDRESS_HASH_LENGTH: usize = 20;

/// Length of the base58check checksum suffix.
pub const CHECKSUM_LENGTH: usize = 4;

/// Length of the random nonce used by [`crate::identity::Did::generate`].
pub const DID_NONCE_LENGTH: usize = 32;

/// Upper bound on an identity's byte length. The storage key encodes the
/// length in a single byte.
pub const MAX_IDENTITY_LENGTH: usize = 255;

// ---------------------------------------------------------------------------
// Storage Layout
// ---------------------------------------------------------------------------

/// Prefix of every key written by the identity contract.
pub const IDENTITY_NAMESPACE: &[u8] = b"sovid/id";

/// Field tag: head pointer and nodes of the public key list.
pub const FIELD_PUBLIC_KEYS: u8 = 0x01;

/// Field tag: head pointer and nodes of the attribute list.
pub const FIELD_ATTRIBUTES: u8 = 0x02;

/// Field tag: serialized controller (identity string or group).
pub const FIELD_CONTROLLER: u8 = 0x03;

/// Field tag: serialized recovery group.
pub const FIELD_RECOVERY: u8 = 0x04;

/// Field tag: last issued key index.
pub const FIELD_KEY_COUNTER: u8 = 0x05;

/// Field tag: head pointer and nodes of the service list.
pub const FIELD_SERVICES: u8 = 0x06;

/// Field tag: serialized list of extra JSON-LD contexts.
pub const FIELD_CONTEXTS: u8 = 0x07;

/// State byte stored under the bare encoded identity.
pub const STATE_ACTIVE: u8 = 0x01;

/// State byte for a revoked identity. Terminal.
pub const STATE_REVOKED: u8 = 0x02;

// ---------------------------------------------------------------------------
// Size Limits
// ---------------------------------------------------------------------------

/// Maximum raw public key size accepted by the key registry.
pub const MAX_PUBLIC_KEY_SIZE: usize = 128;

/// Maximum attribute key size.
pub const MAX_ATTRIBUTE_KEY_SIZE: usize = 80;

/// Maximum attribute value-type size.
pub const MAX_ATTRIBUTE_TYPE_SIZE: usize = 64;

/// Maximum attribute value size (512 KiB).
pub const MAX_ATTRIBUTE_VALUE_SIZE: usize = 512 * 1024;

/// Maximum service id size.
pub const MAX_SERVICE_ID_SIZE: usize = 80;

/// Maximum service type size.
pub const MAX_SERVICE_TYPE_SIZE: usize = 64;

/// Maximum service endpoint size.
pub const MAX_SERVICE_ENDPOINT_SIZE: usize = 2048;

/// Maximum size of one JSON-LD context entry.
pub const MAX_CONTEXT_SIZE: usize = 512;

/// Maximum nesting depth of a threshold group, counting the outermost
/// group as depth 1.
pub const MAX_GROUP_DEPTH: usize = 8;

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Contexts every document carries ahead of the identity's own. Adding one
/// of these is a no-op.
pub const DEFAULT_CONTEXTS: &[&str] = &["https://www.w3.org/ns/did/v1"];

// ---------------------------------------------------------------------------
// Key Access Codes
// ---------------------------------------------------------------------------

/// Access code: key authorizes every call.
pub const ACCESS_ALL: u8 = 0x00;

/// Access code: key may only authenticate, never mutate.
pub const ACCESS_AUTHENTICATION_ONLY: u8 = 0x01;

/// Access code: key authorizes both authentication and mutation.
pub const ACCESS_BOTH: u8 = 0x02;

// ---------------------------------------------------------------------------
// Call Results
// ---------------------------------------------------------------------------

/// Return value of a successful mutating call.
pub const BYTE_TRUE: &[u8] = &[0x01];

/// Return value of a query answered in the negative.
pub const BYTE_FALSE: &[u8] = &[0x00];

/// Crate version, surfaced by the CLI.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");
