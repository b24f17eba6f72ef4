//! Authentication configuration.

use crate::config::ConstraintViolation;

/// Configuration for authenticating requests to the FHIR endpoint.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Enables authentication. When false, all other options are ignored and
    /// requests are sent unauthenticated.
    pub enabled: bool,

    /// Use SMART configuration discovery to resolve the token endpoint.
    pub use_smart: bool,

    /// An explicit OAuth2 token endpoint. Only consulted when [`use_smart`]
    /// is false.
    ///
    /// [`use_smart`]: Self::use_smart
    pub token_endpoint: Option<String>,

    /// The client ID for the client-credentials grant.
    pub client_id: Option<String>,

    /// A client secret, selecting the symmetric authentication profile.
    pub client_secret: Option<String>,

    /// A private key in JWK format, selecting the asymmetric (signed JWT
    /// assertion) authentication profile.
    pub private_key_jwk: Option<String>,

    /// Send symmetric credentials in the form body instead of the
    /// `Authorization: Basic` header.
    pub use_form_for_basic_auth: bool,

    /// A scope value for the client-credentials grant.
    pub scope: Option<String>,

    /// The minimum number of seconds of remaining lifetime a cached token
    /// must have to be used without refreshing.
    pub token_expiry_tolerance: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            use_smart: true,
            token_endpoint: None,
            client_id: None,
            client_secret: None,
            private_key_jwk: None,
            use_form_for_basic_auth: false,
            scope: None,
            token_expiry_tolerance: 120,
        }
    }
}

impl AuthConfig {
    /// Creates a new configuration with authentication disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables authentication.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enables or disables SMART token-endpoint discovery.
    #[must_use]
    pub fn with_use_smart(mut self, use_smart: bool) -> Self {
        self.use_smart = use_smart;
        self
    }

    /// Sets an explicit token endpoint.
    #[must_use]
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the client ID.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets a client secret (symmetric profile).
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets a private key JWK (asymmetric profile).
    #[must_use]
    pub fn with_private_key_jwk(mut self, jwk: impl Into<String>) -> Self {
        self.private_key_jwk = Some(jwk.into());
        self
    }

    /// Sends symmetric credentials in the form body rather than the
    /// `Authorization: Basic` header.
    #[must_use]
    pub fn with_use_form_for_basic_auth(mut self, use_form: bool) -> Self {
        self.use_form_for_basic_auth = use_form;
        self
    }

    /// Sets the requested scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Sets the token expiry tolerance in seconds.
    #[must_use]
    pub fn with_token_expiry_tolerance(mut self, seconds: u64) -> Self {
        self.token_expiry_tolerance = seconds;
        self
    }

    /// Validates this configuration, appending violations under the given
    /// path prefix. Disabling authentication masks all checks.
    pub fn validate(&self, path: &str, violations: &mut Vec<ConstraintViolation>) {
        if !self.enabled {
            return;
        }
        if !self.use_smart && self.token_endpoint.is_none() {
            violations.push(ConstraintViolation::new(
                format!("{path}.token_endpoint"),
                "must be supplied if SMART configuration is not used and auth is enabled",
            ));
        }
        if self.client_id.is_none() {
            violations.push(ConstraintViolation::new(
                format!("{path}.client_id"),
                "must be supplied if auth is enabled",
            ));
        }
        if self.client_secret.is_none() && self.private_key_jwk.is_none() {
            violations.push(ConstraintViolation::new(
                path,
                "either client_secret or private_key_jwk must be supplied if auth is enabled",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(config: &AuthConfig) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();
        config.validate("auth_config", &mut violations);
        violations
    }

    #[test]
    fn valid_if_disabled_despite_missing_parameters() {
        let config = AuthConfig::new().with_enabled(false);
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn valid_smart_with_symmetric_credentials() {
        let config = AuthConfig::new()
            .with_enabled(true)
            .with_use_smart(true)
            .with_client_id("client-id")
            .with_client_secret("client-secret");
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn valid_explicit_endpoint_with_asymmetric_credentials() {
        let config = AuthConfig::new()
            .with_enabled(true)
            .with_use_smart(false)
            .with_token_endpoint("https://example.com/token")
            .with_client_id("client-id")
            .with_private_key_jwk("private-key-jwk");
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn reports_all_violations_for_invalid_configuration() {
        let config = AuthConfig::new().with_enabled(true).with_use_smart(false);
        let violations = validate(&config);

        assert_eq!(
            violations,
            vec![
                ConstraintViolation::new(
                    "auth_config.token_endpoint",
                    "must be supplied if SMART configuration is not used and auth is enabled",
                ),
                ConstraintViolation::new(
                    "auth_config.client_id",
                    "must be supplied if auth is enabled",
                ),
                ConstraintViolation::new(
                    "auth_config",
                    "either client_secret or private_key_jwk must be supplied if auth is enabled",
                ),
            ]
        );
    }
}
