//! Service identity file and authenticated session.

use std::path::Path;

use credcache_core::{AuthorityError, AuthorityResult};
use serde::Deserialize;

/// Service account identity as provisioned on disk (`keys/private.json`).
#[derive(Clone, Deserialize)]
pub struct ServiceIdentity {
    pub client_email: String,
    #[serde(default)]
    pub private_key_id: String,
    pub token: String,
}

impl ServiceIdentity {
    /// Read and parse an identity file.
    pub async fn load(path: &Path) -> AuthorityResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AuthorityError::Authentication {
                reason: format!("cannot read identity file {}: {}", path.display(), e),
            })?;
        Self::parse(&raw)
    }

    /// Parse identity JSON.
    pub fn parse(raw: &str) -> AuthorityResult<Self> {
        let identity: Self =
            serde_json::from_str(raw).map_err(|e| AuthorityError::Authentication {
                reason: format!("malformed identity file: {}", e),
            })?;

        if identity.token.trim().is_empty() {
            return Err(AuthorityError::Authentication {
                reason: "identity file carries an empty token".to_string(),
            });
        }
        Ok(identity)
    }
}

impl std::fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// An authenticated session with the HTTP authority.
#[derive(Clone)]
pub struct HttpSession {
    pub(crate) email: String,
    pub(crate) token: String,
}

impl HttpSession {
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl From<ServiceIdentity> for HttpSession {
    fn from(identity: ServiceIdentity) -> Self {
        Self {
            email: identity.client_email,
            token: identity.token,
        }
    }
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("email", &self.email)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
