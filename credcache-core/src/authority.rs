//! Remote credential authority interface.
//!
//! The authority owns the credentials; credcache only mirrors them. This trait
//! is the whole surface the synchronization engine needs, which keeps the
//! engine testable against an in-process fake and lets the HTTP client in
//! `credcache-authority` be swapped for another transport.

use std::path::Path;

use async_trait::async_trait;

use crate::descriptor::{CredentialDescriptor, Payload};
use crate::error::AuthorityResult;

/// Client for the remote credential authority.
///
/// Implementations must be safe to share across engine tasks.
#[async_trait]
pub trait Authority: Send + Sync {
    /// An authenticated session with the authority.
    type Session: Send + Sync;

    /// Authenticate using the service identity stored at `identity_file`.
    async fn authenticate(&self, identity_file: &Path) -> AuthorityResult<Self::Session>;

    /// Resolve the identity the session acts as.
    async fn resolve_identity(&self, session: &Self::Session) -> AuthorityResult<String>;

    /// Current global index version. Changes whenever any class's index changes.
    async fn get_index_version(&self, session: &Self::Session, identity: &str)
        -> AuthorityResult<i64>;

    /// Full index across all classes.
    async fn get_index(
        &self,
        session: &Self::Session,
        identity: &str,
    ) -> AuthorityResult<Vec<CredentialDescriptor>>;

    /// Fetch the payload set of one credential.
    async fn fetch_payloads(
        &self,
        session: &Self::Session,
        descriptor: &CredentialDescriptor,
        kind: &str,
    ) -> AuthorityResult<Vec<Payload>>;
}
