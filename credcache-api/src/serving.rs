//! Credential lookup.
//!
//! A [`CredentialService`] answers point queries for one credential class.
//! It reads every required attribute from a single read transaction and
//! renders them according to the class schema. It never talks to the
//! authority.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use credcache_core::{AttributeKind, AttributeSpec, CredentialClass, CredentialSchema};
use credcache_storage::CacheStore;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ApiError, ApiResult};

/// A served credential: one JSON field per required attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CredentialRecord(Map<String, Value>);

impl CredentialRecord {
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.0.get(attribute)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Read-only lookup service for one credential class.
pub struct CredentialService<S: CacheStore> {
    schema: &'static CredentialSchema,
    store: Arc<S>,
    not_found_delay: Duration,
}

impl<S: CacheStore> Clone for CredentialService<S> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema,
            store: Arc::clone(&self.store),
            not_found_delay: self.not_found_delay,
        }
    }
}

impl<S: CacheStore> CredentialService<S> {
    pub fn new(schema: &'static CredentialSchema, store: Arc<S>, not_found_delay: Duration) -> Self {
        Self {
            schema,
            store,
            not_found_delay,
        }
    }

    pub fn schema(&self) -> &'static CredentialSchema {
        self.schema
    }

    pub fn class(&self) -> CredentialClass {
        self.schema.class
    }

    /// Look up `name`.
    ///
    /// A store failure is returned at once as a database error. A missing
    /// attribute (never synced, deleted or not yet complete) is returned as
    /// not-found only after the configured delay.
    pub async fn lookup(&self, name: &str) -> ApiResult<CredentialRecord> {
        let names: Vec<&str> = self.schema.attribute_names().collect();
        let values = self.store.read_attributes(self.schema, name, &names)?;

        if values.iter().any(Option::is_none) {
            tracing::debug!(class = %self.class(), name = %name, "credential not found");
            tokio::time::sleep(self.not_found_delay).await;
            return Err(ApiError::credential_not_found(self.class(), name));
        }

        let mut record = Map::with_capacity(self.schema.attributes.len());
        for (spec, value) in self.schema.attributes.iter().zip(values.into_iter().flatten()) {
            record.insert(spec.name.to_string(), self.render(spec, name, &value));
        }

        Ok(CredentialRecord(record))
    }

    fn render(&self, spec: &AttributeSpec, name: &str, value: &[u8]) -> Value {
        match spec.kind {
            AttributeKind::Binary => Value::String(STANDARD.encode(value)),
            AttributeKind::Text => Value::String(String::from_utf8_lossy(value).into_owned()),
            AttributeKind::Integer => Value::from(parse_integer(value).unwrap_or_else(|| {
                // Unparseable integers are served as zero.
                tracing::warn!(
                    class = %self.class(),
                    name = %name,
                    attribute = spec.name,
                    "Stored integer attribute is not a number, serving 0"
                );
                0
            })),
        }
    }
}

fn parse_integer(value: &[u8]) -> Option<i64> {
    std::str::from_utf8(value).ok()?.parse().ok()
}
