//! credcache Test Utilities
//!
//! Shared test infrastructure for the credcache workspace:
//! - A scriptable in-process credential authority
//! - Proptest generators for credential names and versions
//! - Descriptor, payload and store fixtures
//! - Assertions over cache contents

pub use credcache_storage::InMemoryCacheStore;

pub use credcache_core::{
    Authority, AuthorityError, AuthorityResult, CacheEntry, CredentialClass, CredentialDescriptor,
    CredentialSchema, Payload, PROBE_SCHEMA, VPN_SERVICE_SCHEMA,
};

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

/// Identity every [`MockAuthority`] session resolves to.
pub const MOCK_IDENTITY: &str = "cache@trustnetworks.com";

// ============================================================================
// MOCK AUTHORITY
// ============================================================================

type CredentialKey = (CredentialClass, String);

#[derive(Default)]
struct MockState {
    version: i64,
    index: Vec<CredentialDescriptor>,
    payloads: HashMap<CredentialKey, Vec<Payload>>,
    failing_payloads: HashSet<CredentialKey>,
    fetches: HashMap<CredentialKey, u64>,
}

/// Session handed out by [`MockAuthority`].
#[derive(Debug, Clone)]
pub struct MockSession {
    pub identity: String,
}

/// In-process authority with a scriptable index and failure injection.
///
/// `publish` and `remove` bump the index version the way the real authority
/// does on every change; `set_index` gives full control when a test needs a
/// stale or rewound version.
#[derive(Default)]
pub struct MockAuthority {
    state: Mutex<MockState>,
    fail_auth: AtomicBool,
    fail_identity: AtomicBool,
    fail_version: AtomicBool,
    fail_index: AtomicBool,
    version_calls: AtomicU64,
    index_calls: AtomicU64,
}

impl MockAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the whole index and its version.
    pub fn set_index(&self, version: i64, index: Vec<CredentialDescriptor>) {
        let mut state = self.state();
        state.version = version;
        state.index = index;
    }

    /// Change the index version without touching the index.
    pub fn set_version(&self, version: i64) {
        self.state().version = version;
    }

    pub fn version(&self) -> i64 {
        self.state().version
    }

    /// Add or replace a credential and its payloads, bumping the index version.
    pub fn publish(&self, descriptor: CredentialDescriptor, payloads: Vec<Payload>) {
        let mut state = self.state();
        let key = descriptor
            .class()
            .zip(descriptor.name().map(str::to_string));
        if let Some((class, name)) = key {
            let existing = state
                .index
                .iter()
                .position(|d| d.class() == Some(class) && d.name() == Some(name.as_str()));
            state.payloads.insert((class, name), payloads);
            match existing {
                Some(pos) => state.index[pos] = descriptor,
                None => state.index.push(descriptor),
            }
        } else {
            state.index.push(descriptor);
        }
        state.version += 1;
    }

    /// Remove a credential from the index, bumping the index version.
    pub fn remove(&self, class: CredentialClass, name: &str) {
        let mut state = self.state();
        state
            .index
            .retain(|d| !(d.class() == Some(class) && d.name() == Some(name)));
        state.payloads.remove(&(class, name.to_string()));
        state.version += 1;
    }

    /// Set the payloads returned for one credential without touching the index.
    pub fn set_payloads(&self, class: CredentialClass, name: &str, payloads: Vec<Payload>) {
        self.state().payloads.insert((class, name.to_string()), payloads);
    }

    /// Make payload fetches for one credential fail (or succeed again).
    pub fn fail_payloads_for(&self, class: CredentialClass, name: &str, fail: bool) {
        let key = (class, name.to_string());
        let mut state = self.state();
        if fail {
            state.failing_payloads.insert(key);
        } else {
            state.failing_payloads.remove(&key);
        }
    }

    pub fn set_fail_auth(&self, fail: bool) {
        self.fail_auth.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_identity(&self, fail: bool) {
        self.fail_identity.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_version(&self, fail: bool) {
        self.fail_version.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_index(&self, fail: bool) {
        self.fail_index.store(fail, Ordering::SeqCst);
    }

    /// Number of payload fetches for one credential.
    pub fn fetch_count(&self, class: CredentialClass, name: &str) -> u64 {
        self.state()
            .fetches
            .get(&(class, name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of payload fetches for one class.
    pub fn class_fetches(&self, class: CredentialClass) -> u64 {
        self.state()
            .fetches
            .iter()
            .filter(|((c, _), _)| *c == class)
            .map(|(_, count)| count)
            .sum()
    }

    /// Number of payload fetches across all classes.
    pub fn total_fetches(&self) -> u64 {
        self.state().fetches.values().sum()
    }

    pub fn version_calls(&self) -> u64 {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn index_calls(&self) -> u64 {
        self.index_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authority for MockAuthority {
    type Session = MockSession;

    async fn authenticate(&self, _identity_file: &Path) -> AuthorityResult<MockSession> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(AuthorityError::Authentication {
                reason: "mock authentication failure".to_string(),
            });
        }
        Ok(MockSession {
            identity: MOCK_IDENTITY.to_string(),
        })
    }

    async fn resolve_identity(&self, session: &MockSession) -> AuthorityResult<String> {
        if self.fail_identity.load(Ordering::SeqCst) {
            return Err(AuthorityError::Identity {
                reason: "mock identity failure".to_string(),
            });
        }
        Ok(session.identity.clone())
    }

    async fn get_index_version(&self, _session: &MockSession, _identity: &str) -> AuthorityResult<i64> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_version.load(Ordering::SeqCst) {
            return Err(AuthorityError::Request {
                status: 503,
                message: "mock version failure".to_string(),
            });
        }
        Ok(self.state().version)
    }

    async fn get_index(
        &self,
        _session: &MockSession,
        _identity: &str,
    ) -> AuthorityResult<Vec<CredentialDescriptor>> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_index.load(Ordering::SeqCst) {
            return Err(AuthorityError::Request {
                status: 503,
                message: "mock index failure".to_string(),
            });
        }
        Ok(self.state().index.clone())
    }

    async fn fetch_payloads(
        &self,
        _session: &MockSession,
        descriptor: &CredentialDescriptor,
        _kind: &str,
    ) -> AuthorityResult<Vec<Payload>> {
        let (Some(class), Some(name)) = (descriptor.class(), descriptor.name()) else {
            return Err(AuthorityError::InvalidResponse {
                reason: "unrecognized descriptor".to_string(),
            });
        };
        let key = (class, name.to_string());

        let mut state = self.state();
        *state.fetches.entry(key.clone()).or_insert(0) += 1;

        if state.failing_payloads.contains(&key) {
            return Err(AuthorityError::Request {
                status: 500,
                message: format!("mock payload failure for {}", name),
            });
        }
        state
            .payloads
            .get(&key)
            .cloned()
            .ok_or_else(|| AuthorityError::Request {
                status: 404,
                message: format!("no payloads for {}", name),
            })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for credential names and version markers.

    use proptest::prelude::*;

    /// Credential names, including dotted ones.
    pub fn arb_credential_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9.-]{0,10}"
    }

    /// Opaque version markers.
    pub fn arb_version() -> impl Strategy<Value = String> {
        "v[0-9]{1,3}"
    }

    /// A name → version inventory of up to `max` credentials.
    pub fn arb_inventory(max: usize) -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::btree_map(arb_credential_name(), arb_version(), 0..max)
            .prop_map(|map| map.into_iter().collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built descriptors, payload sets and stores.

    use std::sync::Arc;

    use credcache_storage::LmdbCacheStore;
    use tempfile::TempDir;

    use super::*;

    pub const PROBE_HOST: &str = "probe.example.com";
    pub const PROBE_PORT: &str = "9000";
    pub const VPN_HOST: &str = "vpn.example.com";

    pub fn probe_descriptor(name: &str, version: &str) -> CredentialDescriptor {
        CredentialDescriptor::Probe {
            name: name.to_string(),
            end: version.to_string(),
            host: PROBE_HOST.to_string(),
            port: PROBE_PORT.to_string(),
        }
    }

    pub fn vpn_descriptor(name: &str, version: &str) -> CredentialDescriptor {
        CredentialDescriptor::VpnService {
            name: name.to_string(),
            end: version.to_string(),
            host: VPN_HOST.to_string(),
        }
    }

    /// Complete probe payload set. Contents are derived from `seed` so tests
    /// can tell versions apart.
    pub fn probe_payloads(seed: &str) -> Vec<Payload> {
        vec![
            Payload::new("p12", format!("p12-{}", seed).into_bytes()),
            Payload::new("password", format!("pw-{}", seed)),
        ]
    }

    /// Complete vpn-service payload set.
    pub fn vpn_payloads(seed: &str) -> Vec<Payload> {
        vec![
            Payload::new("p12", format!("p12-{}", seed).into_bytes()),
            Payload::new("password", format!("pw-{}", seed)),
            Payload::new("dh.server", format!("dh-{}", seed).into_bytes()),
            Payload::new("ta.key", format!("ta-{}", seed).into_bytes()),
            Payload::new("allocator", format!("alloc-{}", seed)),
            Payload::new("probekey", format!("pk-{}", seed)),
        ]
    }

    /// Descriptor plus matching complete payloads for any class.
    pub fn credential(
        class: CredentialClass,
        name: &str,
        version: &str,
    ) -> (CredentialDescriptor, Vec<Payload>) {
        match class {
            CredentialClass::Probe => (probe_descriptor(name, version), probe_payloads(version)),
            CredentialClass::VpnService => (vpn_descriptor(name, version), vpn_payloads(version)),
        }
    }

    /// Every built-in schema.
    pub fn all_schemas() -> Vec<&'static CredentialSchema> {
        CredentialClass::ALL.iter().map(|c| c.schema()).collect()
    }

    /// LMDB store in a fresh temporary directory with every built-in collection.
    ///
    /// Keep the returned `TempDir` alive for as long as the store is used.
    pub fn temp_lmdb_store() -> (Arc<LmdbCacheStore>, TempDir) {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbCacheStore::open(dir.path(), 10, &all_schemas())
            .expect("LMDB store should open");
        (Arc::new(store), dir)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over cache store contents.

    use credcache_storage::CacheStore;

    use super::*;

    /// Assert that every attribute of a credential is cached at `version`.
    #[track_caller]
    pub fn assert_cached<S: CacheStore + ?Sized>(
        store: &S,
        schema: &CredentialSchema,
        name: &str,
        version: &str,
    ) {
        let stored = schema.stored_attributes();
        let values = store
            .read_attributes(schema, name, &stored)
            .expect("store read should succeed");
        for (attribute, value) in stored.iter().zip(&values) {
            assert!(
                value.is_some(),
                "{} credential {} is missing attribute {}",
                schema.class,
                name,
                attribute
            );
        }
        let marker = values.last().cloned().flatten();
        assert_eq!(
            marker.as_deref(),
            Some(version.as_bytes()),
            "{} credential {} cached at the wrong version",
            schema.class,
            name
        );
    }

    /// Assert that no attribute of a credential is cached.
    #[track_caller]
    pub fn assert_not_cached<S: CacheStore + ?Sized>(
        store: &S,
        schema: &CredentialSchema,
        name: &str,
    ) {
        let values = store
            .read_attributes(schema, name, &schema.stored_attributes())
            .expect("store read should succeed");
        assert!(
            values.iter().all(Option::is_none),
            "{} credential {} should not be cached",
            schema.class,
            name
        );
    }

    /// Assert the exact set of cached names and versions for one class.
    #[track_caller]
    pub fn assert_inventory<S: CacheStore + ?Sized>(
        store: &S,
        schema: &CredentialSchema,
        expected: &[(&str, &str)],
    ) {
        let mut actual = store
            .list_identities(schema)
            .expect("store listing should succeed");
        actual.sort();
        let mut expected: Vec<(String, String)> = expected
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();
        expected.sort();
        assert_eq!(actual, expected, "unexpected {} inventory", schema.class);
    }
}

// ============================================================================
// TESTS
// ============================================================================
