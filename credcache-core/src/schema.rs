//! Credential classes and their attribute schemas.
//!
//! Every credential class the authority issues is described by a static
//! [`CredentialSchema`]: which attributes a complete cache entry carries,
//! where each attribute comes from (a named payload or a descriptor field),
//! and how it is rendered when served. The synchronization engine and the
//! serving layer are generic over this table, so adding a class means adding
//! a schema here and nothing else.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Reserved attribute name under which the version marker is stored.
pub const VERSION_ATTRIBUTE: &str = "end";

/// Payload kind requested from the authority for every class.
pub const DEFAULT_PAYLOAD_KIND: &str = "p12";

// ============================================================================
// CREDENTIAL CLASS
// ============================================================================

/// The closed set of credential classes mirrored by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialClass {
    Probe,
    VpnService,
}

impl CredentialClass {
    /// All known classes, in startup order.
    pub const ALL: [CredentialClass; 2] = [CredentialClass::Probe, CredentialClass::VpnService];

    /// Type tag used by the authority's index for this class.
    pub fn type_tag(&self) -> &'static str {
        match self {
            CredentialClass::Probe => "probe",
            CredentialClass::VpnService => "vpn-service",
        }
    }

    /// Resolve a class from its authority type tag.
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.type_tag() == tag)
    }

    /// The static schema describing this class.
    pub fn schema(&self) -> &'static CredentialSchema {
        match self {
            CredentialClass::Probe => &PROBE_SCHEMA,
            CredentialClass::VpnService => &VPN_SERVICE_SCHEMA,
        }
    }
}

impl fmt::Display for CredentialClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_tag())
    }
}

// ============================================================================
// ATTRIBUTES
// ============================================================================

/// How a stored attribute is rendered in a lookup response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// Opaque bytes, served as standard base64.
    Binary,
    /// UTF-8 text, served verbatim.
    Text,
    /// Decimal text, served as a JSON number. Unparseable values serve as 0.
    Integer,
}

/// Scalar fields carried on an index descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorField {
    Host,
    Port,
}

/// Where the value of an attribute comes from during a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSource {
    /// A payload returned by the authority, matched by payload id.
    Payload(&'static str),
    /// A scalar field of the index descriptor itself.
    Descriptor(DescriptorField),
}

/// One required attribute of a credential class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec {
    /// Attribute name; also the stored key suffix and the response field name.
    pub name: &'static str,
    pub kind: AttributeKind,
    pub source: AttributeSource,
}

impl AttributeSpec {
    const fn payload(name: &'static str, kind: AttributeKind, payload_id: &'static str) -> Self {
        Self {
            name,
            kind,
            source: AttributeSource::Payload(payload_id),
        }
    }

    const fn descriptor(name: &'static str, kind: AttributeKind, field: DescriptorField) -> Self {
        Self {
            name,
            kind,
            source: AttributeSource::Descriptor(field),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Static description of a credential class.
#[derive(Debug, PartialEq, Eq)]
pub struct CredentialSchema {
    pub class: CredentialClass,
    /// Name of the store collection holding this class's entries.
    pub collection: &'static str,
    /// Path prefix routed to this class's lookup service.
    pub route_prefix: &'static str,
    /// Payload kind passed to the authority when fetching payloads.
    pub payload_kind: &'static str,
    /// Required attributes, in response order.
    pub attributes: &'static [AttributeSpec],
}

impl CredentialSchema {
    /// Names of all required attributes.
    pub fn attribute_names(&self) -> impl Iterator<Item = &'static str> {
        self.attributes.iter().map(|attr| attr.name)
    }

    /// Every attribute name stored for one credential, including the version marker.
    pub fn stored_attributes(&self) -> Vec<&'static str> {
        self.attribute_names()
            .chain(std::iter::once(VERSION_ATTRIBUTE))
            .collect()
    }

    /// Look up a required attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&'static AttributeSpec> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Check the structural rules every schema must satisfy.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidSchema {
            class: self.class,
            reason,
        };

        if self.attributes.is_empty() {
            return Err(invalid("no attributes declared".to_string()));
        }
        if self.collection.is_empty() {
            return Err(invalid("empty collection name".to_string()));
        }
        if !self.route_prefix.starts_with('/') || !self.route_prefix.ends_with('/') {
            return Err(invalid(format!(
                "route prefix {} must start and end with '/'",
                self.route_prefix
            )));
        }

        for (i, attr) in self.attributes.iter().enumerate() {
            if attr.name.is_empty() {
                return Err(invalid("empty attribute name".to_string()));
            }
            if attr.name.contains('.') {
                return Err(invalid(format!("attribute name {} contains '.'", attr.name)));
            }
            if attr.name == VERSION_ATTRIBUTE {
                return Err(invalid(format!(
                    "attribute name {} is reserved for the version marker",
                    VERSION_ATTRIBUTE
                )));
            }
            if self.attributes[..i].iter().any(|prev| prev.name == attr.name) {
                return Err(invalid(format!("duplicate attribute {}", attr.name)));
            }
        }

        Ok(())
    }
}

/// Probe credentials: a PKCS#12 bundle, its password and the probe endpoint.
pub static PROBE_SCHEMA: CredentialSchema = CredentialSchema {
    class: CredentialClass::Probe,
    collection: "probe-creds",
    route_prefix: "/probe-creds/",
    payload_kind: DEFAULT_PAYLOAD_KIND,
    attributes: &[
        AttributeSpec::payload("p12", AttributeKind::Binary, "p12"),
        AttributeSpec::payload("password", AttributeKind::Text, "password"),
        AttributeSpec::descriptor("host", AttributeKind::Text, DescriptorField::Host),
        AttributeSpec::descriptor("port", AttributeKind::Integer, DescriptorField::Port),
    ],
};

/// VPN service credentials: server bundle plus Diffie-Hellman and TLS-auth keys.
pub static VPN_SERVICE_SCHEMA: CredentialSchema = CredentialSchema {
    class: CredentialClass::VpnService,
    collection: "vpn-service-creds",
    route_prefix: "/vpn-service-creds/",
    payload_kind: DEFAULT_PAYLOAD_KIND,
    attributes: &[
        AttributeSpec::payload("p12", AttributeKind::Binary, "p12"),
        AttributeSpec::payload("password", AttributeKind::Text, "password"),
        AttributeSpec::payload("dh", AttributeKind::Binary, "dh.server"),
        AttributeSpec::payload("ta", AttributeKind::Binary, "ta.key"),
        AttributeSpec::descriptor("host", AttributeKind::Text, DescriptorField::Host),
        AttributeSpec::payload("allocator", AttributeKind::Text, "allocator"),
        AttributeSpec::payload("probekey", AttributeKind::Text, "probekey"),
    ],
};
