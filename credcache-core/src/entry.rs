//! Cache entries and the per-class inventory snapshot.

use std::collections::BTreeMap;

use crate::descriptor::{CredentialDescriptor, Payload};
use crate::error::SchemaError;
use crate::schema::{AttributeSource, CredentialSchema};

/// A complete, materialized credential ready to be written to the store.
///
/// Construction goes through [`CacheEntry::extract`], which refuses to build an
/// entry unless every attribute of the schema is present. A `CacheEntry` is
/// therefore always complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    name: String,
    version: String,
    attributes: Vec<(&'static str, Vec<u8>)>,
}

impl CacheEntry {
    /// Assemble an entry from a descriptor and the payloads fetched for it.
    ///
    /// Payload attributes are matched by payload id; when the authority returns
    /// the same id twice the last one wins. Descriptor attributes are copied
    /// from the descriptor's scalar fields.
    pub fn extract(
        schema: &CredentialSchema,
        descriptor: &CredentialDescriptor,
        payloads: &[Payload],
    ) -> Result<Self, SchemaError> {
        let (name, version) = match (descriptor.class(), descriptor.name(), descriptor.version()) {
            (Some(class), Some(name), Some(version)) if class == schema.class => (name, version),
            _ => {
                return Err(SchemaError::ClassMismatch {
                    expected: schema.class,
                })
            }
        };

        let mut attributes = Vec::with_capacity(schema.attributes.len());
        for attr in schema.attributes {
            let value = match attr.source {
                AttributeSource::Payload(payload_id) => payloads
                    .iter()
                    .rev()
                    .find(|p| p.id == payload_id)
                    .map(|p| p.payload.clone()),
                AttributeSource::Descriptor(field) => {
                    descriptor.field(field).map(|v| v.as_bytes().to_vec())
                }
            };

            let value = value.ok_or_else(|| SchemaError::MissingAttribute {
                class: schema.class,
                name: name.to_string(),
                attribute: attr.name,
            })?;
            attributes.push((attr.name, value));
        }

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            attributes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Attribute values in schema order, excluding the version marker.
    pub fn attributes(&self) -> &[(&'static str, Vec<u8>)] {
        &self.attributes
    }

    /// Value of a single attribute.
    pub fn attribute(&self, name: &str) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|(attr, _)| *attr == name)
            .map(|(_, value)| value.as_slice())
    }
}

/// The set of credentials currently cached for one class, keyed by name,
/// mapping to the version marker they were cached at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventorySnapshot {
    entries: BTreeMap<String, String>,
}

impl InventorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.entries.insert(name.into(), version.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for InventorySnapshot {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
