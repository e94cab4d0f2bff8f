//! credcache Storage - cache store trait, LMDB backend and in-memory store.
//!
//! The store is partitioned into one collection per credential class. Inside a
//! collection every attribute of a credential lives under `{name}.{attribute}`,
//! with the version marker under the reserved `end` attribute.

pub mod key;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use key::AttributeKey;
pub use lmdb_backend::LmdbCacheStore;
pub use memory::InMemoryCacheStore;
pub use traits::{CacheStore, StoreError, StoreResult};
