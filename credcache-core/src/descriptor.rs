//! Index descriptors and payloads as reported by the remote authority.

use serde::{Deserialize, Serialize};

use crate::schema::{CredentialClass, DescriptorField};

/// One entry of the authority's index.
///
/// The authority tags every record with a `type`; known tags decode into a
/// class-specific variant and anything else into [`CredentialDescriptor::Unrecognized`],
/// which no engine ever reconciles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CredentialDescriptor {
    #[serde(rename = "probe")]
    Probe {
        name: String,
        end: String,
        host: String,
        port: String,
    },

    #[serde(rename = "vpn-service")]
    VpnService {
        name: String,
        end: String,
        host: String,
    },

    #[serde(other)]
    Unrecognized,
}

impl CredentialDescriptor {
    /// The class this descriptor belongs to, if known.
    pub fn class(&self) -> Option<CredentialClass> {
        match self {
            CredentialDescriptor::Probe { .. } => Some(CredentialClass::Probe),
            CredentialDescriptor::VpnService { .. } => Some(CredentialClass::VpnService),
            CredentialDescriptor::Unrecognized => None,
        }
    }

    /// Credential name, unique within its class.
    pub fn name(&self) -> Option<&str> {
        match self {
            CredentialDescriptor::Probe { name, .. }
            | CredentialDescriptor::VpnService { name, .. } => Some(name),
            CredentialDescriptor::Unrecognized => None,
        }
    }

    /// Opaque version marker used for change detection.
    pub fn version(&self) -> Option<&str> {
        match self {
            CredentialDescriptor::Probe { end, .. }
            | CredentialDescriptor::VpnService { end, .. } => Some(end),
            CredentialDescriptor::Unrecognized => None,
        }
    }

    /// A scalar descriptor field, if this variant carries it.
    pub fn field(&self, field: DescriptorField) -> Option<&str> {
        match (self, field) {
            (CredentialDescriptor::Probe { host, .. }, DescriptorField::Host)
            | (CredentialDescriptor::VpnService { host, .. }, DescriptorField::Host) => Some(host),
            (CredentialDescriptor::Probe { port, .. }, DescriptorField::Port) => Some(port),
            _ => None,
        }
    }
}

/// A named payload returned by the authority for one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub id: String,
    pub payload: Vec<u8>,
}

impl Payload {
    pub fn new(id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }
}
