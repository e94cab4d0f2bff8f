//! credcache core - credential classes, schemas, descriptors and the
//! remote authority interface.
//!
//! This crate has no I/O. It defines what a credential looks like to the
//! rest of the workspace: the storage crate persists [`CacheEntry`] values
//! keyed by [`CredentialSchema`], the sync crate drives an [`Authority`], and
//! the API crate renders entries according to each attribute's [`AttributeKind`].

pub mod authority;
pub mod descriptor;
pub mod entry;
pub mod error;
pub mod schema;

pub use authority::Authority;
pub use descriptor::{CredentialDescriptor, Payload};
pub use entry::{CacheEntry, InventorySnapshot};
pub use error::{AuthorityError, AuthorityResult, SchemaError};
pub use schema::{
    AttributeKind, AttributeSource, AttributeSpec, CredentialClass, CredentialSchema,
    DescriptorField, DEFAULT_PAYLOAD_KIND, PROBE_SCHEMA, VERSION_ATTRIBUTE, VPN_SERVICE_SCHEMA,
};
