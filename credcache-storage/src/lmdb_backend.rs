//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB). Each credential class gets
//! its own named database inside a single environment, so classes never
//! share keys and a scan of one class never touches another.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions with MVCC:
//! - Read transactions see a consistent snapshot and never block writers
//! - Write transactions are serialized per environment and commit atomically
//!
//! No method holds a transaction across an await point or network call.

use std::collections::HashMap;
use std::path::Path;

use credcache_core::{CacheEntry, CredentialSchema, VERSION_ATTRIBUTE};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn};

use crate::key::AttributeKey;
use crate::traits::{CacheStore, StoreError, StoreResult};

/// LMDB cache store with one named database per credential class.
///
/// # Example
///
/// ```ignore
/// use credcache_core::CredentialClass;
/// use credcache_storage::LmdbCacheStore;
///
/// let schemas: Vec<_> = CredentialClass::ALL.iter().map(|c| c.schema()).collect();
/// let store = LmdbCacheStore::open("data/creds.db", 64, &schemas)?;
/// let cached = store.list_identities(CredentialClass::Probe.schema())?;
/// ```
pub struct LmdbCacheStore {
    env: Env,
    collections: HashMap<&'static str, Database<Str, Bytes>>,
}

impl LmdbCacheStore {
    /// Open (or create) the store and one collection per schema.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the environment in megabytes
    /// * `schemas` - Schemas whose collections must exist
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        schemas: &[&'static CredentialSchema],
    ) -> StoreResult<Self> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(schemas.len().max(1) as u32)
                .open(path.as_ref())
        }
        .map_err(|e| StoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        let mut collections = HashMap::with_capacity(schemas.len());
        for schema in schemas {
            let db: Database<Str, Bytes> = env
                .create_database(&mut wtxn, Some(schema.collection))
                .map_err(|e| StoreError::EnvOpen(e.to_string()))?;
            collections.insert(schema.collection, db);
        }

        wtxn.commit()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        tracing::debug!(
            path = %path.as_ref().display(),
            collections = collections.len(),
            "Cache store opened"
        );

        Ok(Self { env, collections })
    }

    fn collection(&self, schema: &CredentialSchema) -> StoreResult<Database<Str, Bytes>> {
        self.collections
            .get(schema.collection)
            .copied()
            .ok_or_else(|| StoreError::UnknownCollection(schema.collection.to_string()))
    }

    fn read_txn(&self) -> StoreResult<RoTxn<'_>> {
        self.env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }
}

impl CacheStore for LmdbCacheStore {
    fn get(
        &self,
        schema: &CredentialSchema,
        name: &str,
        attribute: &str,
    ) -> StoreResult<Option<Vec<u8>>> {
        let db = self.collection(schema)?;
        let key = AttributeKey::new(name, attribute).encode();

        let rtxn = self.read_txn()?;
        let value = db
            .get(&rtxn, &key)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        Ok(value.map(<[u8]>::to_vec))
    }

    fn put(
        &self,
        schema: &CredentialSchema,
        name: &str,
        attribute: &str,
        value: &[u8],
    ) -> StoreResult<()> {
        let db = self.collection(schema)?;
        let key = AttributeKey::new(name, attribute).encode();

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        db.put(&mut wtxn, &key, value)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    fn write_entry(&self, schema: &CredentialSchema, entry: &CacheEntry) -> StoreResult<()> {
        let db = self.collection(schema)?;

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        // An error before commit drops `wtxn`, which aborts the whole write.
        for (attribute, value) in entry.attributes() {
            let key = AttributeKey::new(entry.name(), attribute).encode();
            db.put(&mut wtxn, &key, value)
                .map_err(|e| StoreError::Transaction(e.to_string()))?;
        }

        let version_key = AttributeKey::new(entry.name(), VERSION_ATTRIBUTE).encode();
        db.put(&mut wtxn, &version_key, entry.version().as_bytes())
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    fn read_attributes(
        &self,
        schema: &CredentialSchema,
        name: &str,
        attributes: &[&str],
    ) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let db = self.collection(schema)?;
        let rtxn = self.read_txn()?;

        attributes
            .iter()
            .map(|attribute| {
                let key = AttributeKey::new(name, attribute).encode();
                db.get(&rtxn, &key)
                    .map(|value| value.map(<[u8]>::to_vec))
                    .map_err(|e| StoreError::Transaction(e.to_string()))
            })
            .collect()
    }

    fn delete(&self, schema: &CredentialSchema, name: &str) -> StoreResult<u64> {
        let db = self.collection(schema)?;

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        let mut deleted = 0u64;
        for attribute in schema.stored_attributes() {
            let key = AttributeKey::new(name, attribute).encode();
            if db
                .delete(&mut wtxn, &key)
                .map_err(|e| StoreError::Transaction(e.to_string()))?
            {
                deleted += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        Ok(deleted)
    }

    fn list_identities(&self, schema: &CredentialSchema) -> StoreResult<Vec<(String, String)>> {
        let db = self.collection(schema)?;
        let rtxn = self.read_txn()?;

        let iter = db
            .iter(&rtxn)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        let mut identities = Vec::new();
        for result in iter {
            let (key, value) = result.map_err(|e| StoreError::Transaction(e.to_string()))?;
            let Some(decoded) = AttributeKey::decode(key) else {
                continue;
            };
            if decoded.attribute() != VERSION_ATTRIBUTE {
                continue;
            }

            let version = std::str::from_utf8(value).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            identities.push((decoded.name().to_string(), version.to_string()));
        }

        Ok(identities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credcache_core::{
        CredentialClass, CredentialDescriptor, Payload, PROBE_SCHEMA, VPN_SERVICE_SCHEMA,
    };
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbCacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let schemas: Vec<&'static CredentialSchema> =
            CredentialClass::ALL.iter().map(|c| c.schema()).collect();
        let store =
            LmdbCacheStore::open(temp_dir.path(), 10, &schemas).expect("store should open");
        (store, temp_dir)
    }

    fn probe_entry(name: &str, version: &str) -> CacheEntry {
        let descriptor = CredentialDescriptor::Probe {
            name: name.to_string(),
            end: version.to_string(),
            host: "probe.example.com".to_string(),
            port: "9000".to_string(),
        };
        let payloads = vec![
            Payload::new("p12", vec![0xde, 0xad, 0xbe, 0xef]),
            Payload::new("password", format!("pw-{}", version)),
        ];
        CacheEntry::extract(&PROBE_SCHEMA, &descriptor, &payloads)
            .expect("probe entry should be complete")
    }

    #[test]
    fn test_get_nonexistent() {
        let (store, _temp_dir) = create_test_store();
        let value = store
            .get(&PROBE_SCHEMA, "nobody", "p12")
            .expect("get should succeed");
        assert!(value.is_none());
    }

    #[test]
    fn test_put_and_get() {
        let (store, _temp_dir) = create_test_store();
        store
            .put(&PROBE_SCHEMA, "alice", "host", b"probe.example.com")
            .expect("put should succeed");

        let value = store
            .get(&PROBE_SCHEMA, "alice", "host")
            .expect("get should succeed");
        assert_eq!(value.as_deref(), Some(&b"probe.example.com"[..]));
    }

    #[test]
    fn test_write_entry_stores_every_attribute_and_version() {
        let (store, _temp_dir) = create_test_store();
        let entry = probe_entry("alice", "v1");
        store
            .write_entry(&PROBE_SCHEMA, &entry)
            .expect("write_entry should succeed");

        let stored = PROBE_SCHEMA.stored_attributes();
        let values = store
            .read_attributes(&PROBE_SCHEMA, "alice", &stored)
            .expect("read should succeed");
        assert!(values.iter().all(Option::is_some));
        assert_eq!(values[0].as_deref(), Some(&[0xde, 0xad, 0xbe, 0xef][..]));
        assert_eq!(values[4].as_deref(), Some(&b"v1"[..]));
    }

    #[test]
    fn test_write_entry_overwrites() {
        let (store, _temp_dir) = create_test_store();
        store
            .write_entry(&PROBE_SCHEMA, &probe_entry("alice", "v1"))
            .expect("first write should succeed");
        store
            .write_entry(&PROBE_SCHEMA, &probe_entry("alice", "v2"))
            .expect("second write should succeed");

        let password = store
            .get(&PROBE_SCHEMA, "alice", "password")
            .expect("get should succeed");
        assert_eq!(password.as_deref(), Some(&b"pw-v2"[..]));
        assert_eq!(
            store.list_identities(&PROBE_SCHEMA).expect("list should succeed"),
            vec![("alice".to_string(), "v2".to_string())]
        );
    }

    #[test]
    fn test_delete_removes_all_attributes() {
        let (store, _temp_dir) = create_test_store();
        store
            .write_entry(&PROBE_SCHEMA, &probe_entry("alice", "v1"))
            .expect("write should succeed");

        let deleted = store
            .delete(&PROBE_SCHEMA, "alice")
            .expect("delete should succeed");
        assert_eq!(deleted, PROBE_SCHEMA.stored_attributes().len() as u64);

        let values = store
            .read_attributes(&PROBE_SCHEMA, "alice", &PROBE_SCHEMA.stored_attributes())
            .expect("read should succeed");
        assert!(values.iter().all(Option::is_none));
    }

    #[test]
    fn test_delete_leaves_dotted_neighbours_alone() {
        let (store, _temp_dir) = create_test_store();
        store
            .write_entry(&PROBE_SCHEMA, &probe_entry("a", "v1"))
            .expect("write should succeed");
        store
            .write_entry(&PROBE_SCHEMA, &probe_entry("a.p12", "v1"))
            .expect("write should succeed");

        store.delete(&PROBE_SCHEMA, "a").expect("delete should succeed");

        let identities = store
            .list_identities(&PROBE_SCHEMA)
            .expect("list should succeed");
        assert_eq!(identities, vec![("a.p12".to_string(), "v1".to_string())]);
    }

    #[test]
    fn test_delete_nonexistent_is_noop() {
        let (store, _temp_dir) = create_test_store();
        let deleted = store
            .delete(&PROBE_SCHEMA, "ghost")
            .expect("delete should succeed");
        assert_eq!(deleted, 0);
    }

    #[test]
    fn test_collections_are_isolated() {
        let (store, _temp_dir) = create_test_store();
        store
            .write_entry(&PROBE_SCHEMA, &probe_entry("alice", "v1"))
            .expect("write should succeed");

        let vpn = store
            .list_identities(&VPN_SERVICE_SCHEMA)
            .expect("list should succeed");
        assert!(vpn.is_empty());
        assert!(store
            .get(&VPN_SERVICE_SCHEMA, "alice", "p12")
            .expect("get should succeed")
            .is_none());
    }

    #[test]
    fn test_list_identities_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let schemas: Vec<&'static CredentialSchema> = vec![&PROBE_SCHEMA];
        {
            let store =
                LmdbCacheStore::open(temp_dir.path(), 10, &schemas).expect("store should open");
            store
                .write_entry(&PROBE_SCHEMA, &probe_entry("alice", "v1"))
                .expect("write should succeed");
            store
                .write_entry(&PROBE_SCHEMA, &probe_entry("bob", "v9"))
                .expect("write should succeed");
        }

        let store =
            LmdbCacheStore::open(temp_dir.path(), 10, &schemas).expect("store should reopen");
        let mut identities = store
            .list_identities(&PROBE_SCHEMA)
            .expect("list should succeed");
        identities.sort();
        assert_eq!(
            identities,
            vec![
                ("alice".to_string(), "v1".to_string()),
                ("bob".to_string(), "v9".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_collection() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbCacheStore::open(temp_dir.path(), 10, &[&PROBE_SCHEMA])
            .expect("store should open");

        let err = store
            .get(&VPN_SERVICE_SCHEMA, "alice", "p12")
            .expect_err("vpn collection was never opened");
        assert!(matches!(err, StoreError::UnknownCollection(_)));
    }
}
