//! Synchronization engine errors.
//!
//! Only failures that stop an engine surface here. Transient authority and
//! store errors during a poll are logged, counted and retried on the next poll.

use credcache_core::{AuthorityError, CredentialClass, SchemaError};
use credcache_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The class schema failed validation.
    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),

    /// Authentication against the authority failed at engine start.
    #[error("{class} engine failed to authenticate: {source}")]
    Authentication {
        class: CredentialClass,
        #[source]
        source: AuthorityError,
    },

    /// The acting identity could not be resolved at engine start.
    #[error("{class} engine failed to resolve identity: {source}")]
    Identity {
        class: CredentialClass,
        #[source]
        source: AuthorityError,
    },

    /// The inventory snapshot could not be rebuilt from the store.
    #[error("{class} engine failed to read the cache inventory: {source}")]
    Inventory {
        class: CredentialClass,
        #[source]
        source: StoreError,
    },
}

pub type SyncResult<T> = Result<T, SyncError>;
