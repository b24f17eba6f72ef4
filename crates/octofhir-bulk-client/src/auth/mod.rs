//! SMART-on-FHIR token acquisition for authenticated exports.
//!
//! This module covers the client side of the OAuth 2.0 client-credentials
//! grant as profiled by SMART Backend Services:
//!
//! - [`AuthConfig`] - authentication options and their validation
//! - SMART discovery - resolving the token endpoint from
//!   `/.well-known/smart-configuration`
//! - Symmetric (client secret) and asymmetric (RFC 7523 JWT assertion)
//!   client authentication
//! - [`TokenProvider`] - token caching with expiry tolerance and serialized
//!   refresh
//!
//! # References
//!
//! - [SMART Backend Services](https://hl7.org/fhir/uv/bulkdata/authorization/)
//! - [RFC 7523 - JWT Profile for Client Authentication](https://tools.ietf.org/html/rfc7523)

mod config;
mod jwk;
mod provider;
mod smart;

pub use config::AuthConfig;
pub use jwk::{SigningKey, parse_private_jwk};
pub use provider::{TokenCredential, TokenProvider};
pub use smart::{SmartConfiguration, discover_token_endpoint, discovery_url};

/// Errors that can occur during token acquisition.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A network error occurred while talking to the discovery or token
    /// endpoint.
    #[error("Network error: {0}")]
    Network(String),

    /// The discovery or token endpoint returned a non-success status code.
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// A response body could not be parsed.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// A required field is missing from a response.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The authentication configuration is incomplete for the requested
    /// operation.
    #[error("Invalid auth configuration: {0}")]
    Configuration(String),

    /// The configured JWK uses a key type or algorithm this client does not
    /// support.
    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    /// The configured JWK is malformed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Signing the client assertion failed.
    #[error("Failed to sign client assertion: {0}")]
    Signing(String),
}
