//! # Identity Contract Errors
//!
//! Every operation returns `Result<_, IdentityError>`. The first error stops
//! the call and is handed back verbatim; the host is expected to discard the
//! call's overlay, so no partial write ever survives an `Err`.

use sovid_protocol::codec::CodecError;
use sovid_protocol::identity::DidError;
use sovid_protocol::storage::{StorageError, StorageResult};
use thiserror::Error;

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The target identity has never been registered.
    #[error("identity {0} is not registered")]
    NotRegistered(String),

    /// Registration was attempted for an identity that already exists.
    #[error("identity {0} is already registered")]
    AlreadyRegistered(String),

    /// The identity has been revoked and accepts no further calls.
    #[error("identity {0} has been revoked")]
    AlreadyRevoked(String),

    /// Unknown key index, revoked key, insufficient access level, missing
    /// witness or unmet threshold.
    #[error("authorization failed: {0}")]
    AuthorizationFailed(String),

    /// Oversized or malformed input: bad identity string, bad group
    /// structure, undecodable request.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The item, controller or recovery group already exists.
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    /// A lookup found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The key-value layer failed.
    #[error("storage error during {op}: {source}")]
    Storage {
        /// What the contract was doing when the store failed.
        op: &'static str,
        #[source]
        source: StorageError,
    },
}

pub type IdentityResult<T> = Result<T, IdentityError>;

impl From<CodecError> for IdentityError {
    fn from(err: CodecError) -> Self {
        IdentityError::ValidationFailed(format!("malformed input: {err}"))
    }
}

impl From<DidError> for IdentityError {
    fn from(err: DidError) -> Self {
        IdentityError::ValidationFailed(err.to_string())
    }
}

/// Attach an operation name to a storage failure.
pub(crate) trait StorageContext<T> {
    fn during(self, op: &'static str) -> IdentityResult<T>;
}

impl<T> StorageContext<T> for StorageResult<T> {
    fn during(self, op: &'static str) -> IdentityResult<T> {
        self.map_err(|source| IdentityError::Storage { op, source })
    }
}

/// Render raw identity bytes for error messages and logs.
pub(crate) fn display_id(id: &[u8]) -> String {
    String::from_utf8_lossy(id).into_owned()
}
