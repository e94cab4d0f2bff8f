//! credcache Authority - HTTP client for the remote credential authority.
//!
//! [`HttpAuthority`] implements [`credcache_core::Authority`] over HTTPS with a
//! bearer token taken from the service identity file.

pub mod client;
pub mod identity;
pub mod types;

pub use client::{HttpAuthority, DEFAULT_REQUEST_TIMEOUT};
pub use identity::{HttpSession, ServiceIdentity};
pub use types::{IndexVersionResponse, PayloadRecord};
