//! Error types shared across credcache crates

use thiserror::Error;

use crate::schema::CredentialClass;

/// Errors returned by a remote credential authority.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    #[error("Identity resolution failed: {reason}")]
    Identity { reason: String },

    #[error("Request to authority failed with status {status}: {message}")]
    Request { status: u16, message: String },

    #[error("Invalid response from authority: {reason}")]
    InvalidResponse { reason: String },

    #[error("Invalid authority client configuration: {reason}")]
    Configuration { reason: String },
}

/// Schema and extraction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Missing attribute {attribute} for {class} credential {name}")]
    MissingAttribute {
        class: CredentialClass,
        name: String,
        attribute: &'static str,
    },

    #[error("Descriptor does not describe a {expected} credential")]
    ClassMismatch { expected: CredentialClass },

    #[error("Invalid schema for {class}: {reason}")]
    InvalidSchema {
        class: CredentialClass,
        reason: String,
    },
}

/// Result type for authority calls.
pub type AuthorityResult<T> = Result<T, AuthorityError>;
