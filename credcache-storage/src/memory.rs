//! In-memory cache store for testing.
//!
//! Collections are created on first use, so any schema works without being
//! registered up front. Reads and writes can be made to fail on demand to
//! exercise the error paths of the engine and the serving layer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use credcache_core::{CacheEntry, CredentialSchema, VERSION_ATTRIBUTE};

use crate::key::AttributeKey;
use crate::traits::{CacheStore, StoreError, StoreResult};

type Collection = BTreeMap<String, Vec<u8>>;

/// In-memory [`CacheStore`] with failure injection.
///
/// A single lock guards every collection, so multi-attribute operations are
/// atomic the same way they are with LMDB.
#[derive(Default)]
pub struct InMemoryCacheStore {
    collections: RwLock<HashMap<&'static str, Collection>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_writes_for: RwLock<HashSet<String>>,
    entries_written: AtomicU64,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail with a transaction error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write and delete fail with a transaction error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make writes and deletes of a single credential name fail.
    pub fn fail_writes_for(&self, name: impl Into<String>) {
        if let Ok(mut names) = self.fail_writes_for.write() {
            names.insert(name.into());
        }
    }

    /// Clear every per-name write failure.
    pub fn clear_write_failures(&self) {
        if let Ok(mut names) = self.fail_writes_for.write() {
            names.clear();
        }
    }

    /// Number of successful `write_entry` calls.
    pub fn entries_written(&self) -> u64 {
        self.entries_written.load(Ordering::SeqCst)
    }

    /// Every key and value currently stored for one schema.
    pub fn dump(&self, schema: &CredentialSchema) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(collections
            .get(schema.collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn check_read(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Transaction("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self, name: &str) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Transaction("injected write failure".to_string()));
        }
        let names = self
            .fail_writes_for
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        if names.contains(name) {
            return Err(StoreError::Transaction(format!(
                "injected write failure for {}",
                name
            )));
        }
        Ok(())
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(
        &self,
        schema: &CredentialSchema,
        name: &str,
        attribute: &str,
    ) -> StoreResult<Option<Vec<u8>>> {
        self.check_read()?;
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        let key = AttributeKey::new(name, attribute).encode();
        Ok(collections
            .get(schema.collection)
            .and_then(|c| c.get(&key).cloned()))
    }

    fn put(
        &self,
        schema: &CredentialSchema,
        name: &str,
        attribute: &str,
        value: &[u8],
    ) -> StoreResult<()> {
        self.check_write(name)?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        collections
            .entry(schema.collection)
            .or_default()
            .insert(AttributeKey::new(name, attribute).encode(), value.to_vec());
        Ok(())
    }

    fn write_entry(&self, schema: &CredentialSchema, entry: &CacheEntry) -> StoreResult<()> {
        self.check_write(entry.name())?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        let collection = collections.entry(schema.collection).or_default();

        for (attribute, value) in entry.attributes() {
            collection.insert(
                AttributeKey::new(entry.name(), attribute).encode(),
                value.clone(),
            );
        }
        collection.insert(
            AttributeKey::new(entry.name(), VERSION_ATTRIBUTE).encode(),
            entry.version().as_bytes().to_vec(),
        );

        self.entries_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_attributes(
        &self,
        schema: &CredentialSchema,
        name: &str,
        attributes: &[&str],
    ) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.check_read()?;
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        let collection = collections.get(schema.collection);

        Ok(attributes
            .iter()
            .map(|attribute| {
                let key = AttributeKey::new(name, attribute).encode();
                collection.and_then(|c| c.get(&key).cloned())
            })
            .collect())
    }

    fn delete(&self, schema: &CredentialSchema, name: &str) -> StoreResult<u64> {
        self.check_write(name)?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        let Some(collection) = collections.get_mut(schema.collection) else {
            return Ok(0);
        };

        let deleted = schema
            .stored_attributes()
            .into_iter()
            .filter(|attribute| {
                collection
                    .remove(&AttributeKey::new(name, attribute).encode())
                    .is_some()
            })
            .count();
        Ok(deleted as u64)
    }

    fn list_identities(&self, schema: &CredentialSchema) -> StoreResult<Vec<(String, String)>> {
        self.check_read()?;
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        let Some(collection) = collections.get(schema.collection) else {
            return Ok(Vec::new());
        };

        collection
            .iter()
            .filter_map(|(key, value)| {
                AttributeKey::decode(key)
                    .filter(|decoded| decoded.attribute() == VERSION_ATTRIBUTE)
                    .map(|decoded| (key, decoded.name(), value))
            })
            .map(|(key, name, value)| {
                String::from_utf8(value.clone())
                    .map(|version| (name.to_string(), version))
                    .map_err(|e| StoreError::Corrupt {
                        key: key.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }
}
