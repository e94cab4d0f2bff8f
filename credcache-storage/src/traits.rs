//! Cache store trait and error type.

use credcache_core::{CacheEntry, CredentialSchema};

/// Error type for cache store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to open or create the store environment.
    #[error("Failed to open store environment: {0}")]
    EnvOpen(String),

    /// The schema's collection was not registered when the store was opened.
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A stored value could not be interpreted.
    #[error("Corrupt value under {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Store lock poisoned.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Transactional key-value store partitioned into one collection per
/// credential class.
///
/// Every method runs in its own transaction. Multi-attribute operations
/// (`write_entry`, `read_attributes`, `delete`) are atomic: a concurrent
/// reader observes either all of a write or none of it.
pub trait CacheStore: Send + Sync {
    /// Read one attribute of one credential.
    fn get(
        &self,
        schema: &CredentialSchema,
        name: &str,
        attribute: &str,
    ) -> StoreResult<Option<Vec<u8>>>;

    /// Write one attribute of one credential.
    fn put(
        &self,
        schema: &CredentialSchema,
        name: &str,
        attribute: &str,
        value: &[u8],
    ) -> StoreResult<()>;

    /// Write every attribute of `entry` plus its version marker in one transaction.
    fn write_entry(&self, schema: &CredentialSchema, entry: &CacheEntry) -> StoreResult<()>;

    /// Read several attributes of one credential from a single read transaction.
    ///
    /// The result has one slot per requested attribute, in request order.
    fn read_attributes(
        &self,
        schema: &CredentialSchema,
        name: &str,
        attributes: &[&str],
    ) -> StoreResult<Vec<Option<Vec<u8>>>>;

    /// Remove every stored attribute of one credential in one transaction.
    ///
    /// Returns the number of keys removed.
    fn delete(&self, schema: &CredentialSchema, name: &str) -> StoreResult<u64>;

    /// Every cached credential name with its stored version marker.
    fn list_identities(&self, schema: &CredentialSchema) -> StoreResult<Vec<(String, String)>>;
}
