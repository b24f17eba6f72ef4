//! Token acquisition, caching, and refresh.
//!
//! One provider instance owns one cached token. Every protocol request asks
//! the provider for a bearer value; the provider refreshes synchronously
//! when the cached token is within the configured expiry tolerance, and
//! concurrent callers serialize on that one refresh.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, OnceCell};
use url::Url;
use uuid::Uuid;

use super::AuthError;
use super::config::AuthConfig;
use super::jwk::parse_private_jwk;
use super::smart::discover_token_endpoint;

/// The OAuth2 client-assertion type for RFC 7523 JWT bearer assertions.
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Maximum client-assertion lifetime (5 minutes per the SMART spec).
const ASSERTION_LIFETIME_SECS: i64 = 300;

/// A bearer token and its absolute expiry.
#[derive(Debug, Clone)]
pub struct TokenCredential {
    /// The opaque bearer value.
    pub access_token: String,
    /// When the token expires, derived from `expires_in` at receipt time.
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ClientAssertionClaims {
    iss: String,
    sub: String,
    aud: String,
    exp: i64,
    iat: i64,
    jti: String,
}

/// Acquires and caches bearer tokens for a single FHIR endpoint.
pub struct TokenProvider {
    http: reqwest::Client,
    fhir_endpoint: Url,
    config: AuthConfig,
    token_endpoint: OnceCell<String>,
    cached: Mutex<Option<TokenCredential>>,
}

impl TokenProvider {
    /// Creates a provider for the given endpoint and configuration.
    ///
    /// Returns `None` when authentication is disabled; the transport then
    /// sends unauthenticated requests.
    #[must_use]
    pub fn new(http: reqwest::Client, fhir_endpoint: Url, config: AuthConfig) -> Option<Self> {
        config.enabled.then(|| Self {
            http,
            fhir_endpoint,
            config,
            token_endpoint: OnceCell::new(),
            cached: Mutex::new(None),
        })
    }

    /// Whether the bearer token may be attached to a request for the given
    /// URL. Only same-origin URLs (scheme, host, and port matching the FHIR
    /// endpoint) receive the token; manifest download URLs may point at a
    /// CDN that must not see it.
    #[must_use]
    pub fn applies_to(&self, url: &Url) -> bool {
        url.scheme() == self.fhir_endpoint.scheme()
            && url.host_str() == self.fhir_endpoint.host_str()
            && url.port_or_known_default() == self.fhir_endpoint.port_or_known_default()
    }

    /// Returns a bearer token with at least `token_expiry_tolerance` seconds
    /// of remaining lifetime, refreshing if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint cannot be resolved or the
    /// token request fails.
    pub async fn bearer_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            let tolerance =
                time::Duration::seconds(i64::try_from(self.config.token_expiry_tolerance).unwrap_or(i64::MAX));
            if credential.expires_at - OffsetDateTime::now_utc() > tolerance {
                return Ok(credential.access_token.clone());
            }
            tracing::debug!("Cached token within expiry tolerance, refreshing");
        }

        let endpoint = self.resolve_token_endpoint().await?.to_string();
        let fresh = self.request_token(&endpoint).await?;
        let token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Resolves the token endpoint once: SMART discovery when enabled,
    /// otherwise the configured value.
    async fn resolve_token_endpoint(&self) -> Result<&str, AuthError> {
        self.token_endpoint
            .get_or_try_init(|| async {
                if self.config.use_smart {
                    discover_token_endpoint(&self.http, &self.fhir_endpoint).await
                } else {
                    self.config.token_endpoint.clone().ok_or_else(|| {
                        AuthError::Configuration(
                            "token_endpoint is required when SMART discovery is disabled"
                                .to_string(),
                        )
                    })
                }
            })
            .await
            .map(String::as_str)
    }

    async fn request_token(&self, token_endpoint: &str) -> Result<TokenCredential, AuthError> {
        let client_id = self.config.client_id.clone().ok_or_else(|| {
            AuthError::Configuration("client_id is required when auth is enabled".to_string())
        })?;

        let mut form: Vec<(&str, String)> =
            vec![("grant_type", "client_credentials".to_string())];
        if let Some(scope) = &self.config.scope {
            form.push(("scope", scope.clone()));
        }

        let mut request = self
            .http
            .post(token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(secret) = &self.config.client_secret {
            if self.config.use_form_for_basic_auth {
                form.push(("client_id", client_id));
                form.push(("client_secret", secret.clone()));
            } else {
                request = request.basic_auth(&client_id, Some(secret));
            }
        } else if let Some(jwk) = &self.config.private_key_jwk {
            let assertion = build_client_assertion(jwk, &client_id, token_endpoint)?;
            form.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()));
            form.push(("client_assertion", assertion));
        } else {
            return Err(AuthError::Configuration(
                "either client_secret or private_key_jwk is required".to_string(),
            ));
        }

        tracing::debug!("Requesting access token from {}", token_endpoint);
        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                "Token endpoint {} returned status {}",
                token_endpoint,
                status
            );
            return Err(AuthError::Http(status.as_u16()));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Parse(e.to_string()))?;

        // absent expires_in means the token is never considered fresh;
        // oversized values are capped to keep the expiry representable
        const MAX_EXPIRES_IN_SECS: u64 = 10 * 365 * 24 * 60 * 60;
        let expires_in = token.expires_in.unwrap_or(0).min(MAX_EXPIRES_IN_SECS);
        Ok(TokenCredential {
            access_token: token.access_token,
            expires_at: OffsetDateTime::now_utc() + time::Duration::seconds(expires_in as i64),
        })
    }
}

/// Builds the RFC 7523 client assertion: a JWT signed with the configured
/// JWK, addressed to the token endpoint.
fn build_client_assertion(
    jwk_json: &str,
    client_id: &str,
    token_endpoint: &str,
) -> Result<String, AuthError> {
    let signing_key = parse_private_jwk(jwk_json)?;
    let now = OffsetDateTime::now_utc().unix_timestamp();

    let claims = ClientAssertionClaims {
        iss: client_id.to_string(),
        sub: client_id.to_string(),
        aud: token_endpoint.to_string(),
        exp: now + ASSERTION_LIFETIME_SECS,
        iat: now,
        jti: Uuid::new_v4().to_string(),
    };

    let mut header = jsonwebtoken::Header::new(signing_key.algorithm);
    header.kid = signing_key.kid;

    jsonwebtoken::encode(&header, &claims, &signing_key.key)
        .map_err(|e| AuthError::Signing(e.to_string()))
}
