//! reqwest-backed authority client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use credcache_core::{
    Authority, AuthorityError, AuthorityResult, CredentialDescriptor, Payload,
};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use crate::identity::{HttpSession, ServiceIdentity};
use crate::types::{decode_index, IndexVersionResponse, PayloadRecord};

/// Default per-request timeout for authority calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Credential authority reached over HTTPS.
///
/// Endpoints, relative to the base URL:
/// - `GET v1/users/{identity}/index/version`
/// - `GET v1/users/{identity}/index`
/// - `GET v1/users/{identity}/credentials/{type}/{name}/payloads/{kind}`
#[derive(Clone)]
pub struct HttpAuthority {
    client: Client,
    base_url: Url,
}

impl HttpAuthority {
    /// Create a client for the authority at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> AuthorityResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| AuthorityError::Configuration {
            reason: format!("invalid authority URL {}: {}", base_url, e),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AuthorityError::Configuration {
                reason: format!("authority URL {} cannot be a base", base_url),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthorityError::Configuration {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join percent-encoded path segments onto the base URL.
    fn endpoint(&self, segments: &[&str]) -> AuthorityResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AuthorityError::Configuration {
                reason: format!("authority URL {} cannot be a base", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: &HttpSession,
        url: Url,
    ) -> AuthorityResult<T> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&session.token)
            .send()
            .await
            .map_err(|e| AuthorityError::Request {
                status: 0,
                message: format!("HTTP request to {} failed: {}", url.path(), e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AuthorityError::Request {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| AuthorityError::InvalidResponse {
                reason: format!("failed to parse response from {}: {}", url.path(), e),
            })
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    type Session = HttpSession;

    async fn authenticate(&self, identity_file: &Path) -> AuthorityResult<HttpSession> {
        let identity = ServiceIdentity::load(identity_file).await?;
        tracing::debug!(
            client_email = %identity.client_email,
            private_key_id = %identity.private_key_id,
            "Loaded service identity"
        );
        Ok(identity.into())
    }

    async fn resolve_identity(&self, session: &HttpSession) -> AuthorityResult<String> {
        if session.email.trim().is_empty() {
            return Err(AuthorityError::Identity {
                reason: "service identity has no client email".to_string(),
            });
        }
        Ok(session.email.clone())
    }

    async fn get_index_version(
        &self,
        session: &HttpSession,
        identity: &str,
    ) -> AuthorityResult<i64> {
        let url = self.endpoint(&["v1", "users", identity, "index", "version"])?;
        let response: IndexVersionResponse = self.get_json(session, url).await?;
        Ok(response.version)
    }

    async fn get_index(
        &self,
        session: &HttpSession,
        identity: &str,
    ) -> AuthorityResult<Vec<CredentialDescriptor>> {
        let url = self.endpoint(&["v1", "users", identity, "index"])?;
        let records: Vec<serde_json::Value> = self.get_json(session, url).await?;
        Ok(decode_index(records))
    }

    async fn fetch_payloads(
        &self,
        session: &HttpSession,
        descriptor: &CredentialDescriptor,
        kind: &str,
    ) -> AuthorityResult<Vec<Payload>> {
        let (Some(class), Some(name)) = (descriptor.class(), descriptor.name()) else {
            return Err(AuthorityError::InvalidResponse {
                reason: "cannot fetch payloads for an unrecognized descriptor".to_string(),
            });
        };

        let url = self.endpoint(&[
            "v1",
            "users",
            &session.email,
            "credentials",
            class.type_tag(),
            name,
            "payloads",
            kind,
        ])?;

        let records: Vec<PayloadRecord> = self.get_json(session, url).await?;
        records.into_iter().map(Payload::try_from).collect()
    }
}

impl std::fmt::Debug for HttpAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthority")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}
