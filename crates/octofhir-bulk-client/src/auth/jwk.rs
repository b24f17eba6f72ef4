//! Private-key JWK handling for the asymmetric client authentication
//! profile.
//!
//! `jsonwebtoken` only accepts PEM or DER key material, so the RSA private
//! key is reassembled from the JWK's base64url components and re-encoded as
//! PKCS#1 DER. RSA is the key family SMART servers mint for backend-services
//! clients; other key types are rejected with a clear error.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::{BigUint, RsaPrivateKey};
use serde::Deserialize;

use super::AuthError;

/// A signing key ready for use with `jsonwebtoken`.
pub struct SigningKey {
    /// The algorithm named by the JWK's `alg` field.
    pub algorithm: Algorithm,
    /// The JWK's key ID, propagated into the JWT header when present.
    pub kid: Option<String>,
    /// The encoding key.
    pub key: EncodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct PrivateJwk {
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    d: Option<String>,
    #[serde(default)]
    p: Option<String>,
    #[serde(default)]
    q: Option<String>,
}

/// Parses a private-key JWK into a signing key.
///
/// # Errors
///
/// Returns an error if the JWK is not valid JSON, names an unsupported key
/// type or algorithm, or is missing private key material.
pub fn parse_private_jwk(jwk_json: &str) -> Result<SigningKey, AuthError> {
    let jwk: PrivateJwk =
        serde_json::from_str(jwk_json).map_err(|e| AuthError::Parse(e.to_string()))?;

    if jwk.kty != "RSA" {
        return Err(AuthError::UnsupportedKey(format!(
            "key type '{}' (only RSA keys are supported)",
            jwk.kty
        )));
    }

    let algorithm = match jwk.alg.as_deref().unwrap_or("RS384") {
        "RS256" => Algorithm::RS256,
        "RS384" => Algorithm::RS384,
        "RS512" => Algorithm::RS512,
        other => {
            return Err(AuthError::UnsupportedKey(format!(
                "algorithm '{other}' (only RS256, RS384 and RS512 are supported)"
            )));
        }
    };

    let n = decode_component(&jwk.n, "n")?;
    let e = decode_component(&jwk.e, "e")?;
    let d = decode_component(&jwk.d, "d")?;
    let p = decode_component(&jwk.p, "p")?;
    let q = decode_component(&jwk.q, "q")?;

    let mut private_key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
        .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
    private_key
        .precompute()
        .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
    let der = private_key
        .to_pkcs1_der()
        .map_err(|e| AuthError::InvalidKey(e.to_string()))?;

    Ok(SigningKey {
        algorithm,
        kid: jwk.kid,
        key: EncodingKey::from_rsa_der(der.as_bytes()),
    })
}

fn decode_component(value: &Option<String>, name: &str) -> Result<BigUint, AuthError> {
    let encoded = value
        .as_deref()
        .ok_or_else(|| AuthError::InvalidKey(format!("missing RSA component '{name}'")))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| AuthError::InvalidKey(format!("component '{name}': {e}")))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    // A deliberately tiny RSA key (p = 61, q = 53, e = 17, d = 413); key
    // material only has to be internally consistent for parsing.
    fn tiny_rsa_jwk(alg: &str) -> String {
        format!(
            r#"{{"kty":"RSA","alg":"{alg}","kid":"test-key","n":"DKE","e":"EQ","d":"AZ0","p":"PQ","q":"NQ"}}"#
        )
    }

    #[test]
    fn parses_rsa_private_jwk() {
        let key = parse_private_jwk(&tiny_rsa_jwk("RS384")).unwrap();
        assert_eq!(key.algorithm, Algorithm::RS384);
        assert_eq!(key.kid.as_deref(), Some("test-key"));
    }

    #[test]
    fn defaults_to_rs384_when_alg_absent() {
        let jwk = r#"{"kty":"RSA","n":"DKE","e":"EQ","d":"AZ0","p":"PQ","q":"NQ"}"#;
        let key = parse_private_jwk(jwk).unwrap();
        assert_eq!(key.algorithm, Algorithm::RS384);
        assert!(key.kid.is_none());
    }

    #[test]
    fn rejects_non_rsa_key_types() {
        let jwk = r#"{"kty":"EC","alg":"ES384","crv":"P-384"}"#;
        let err = parse_private_jwk(jwk).unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedKey(_)));
    }

    #[test]
    fn rejects_unsupported_algorithms() {
        let err = parse_private_jwk(&tiny_rsa_jwk("PS256")).unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedKey(_)));
    }

    #[test]
    fn rejects_public_only_keys() {
        let jwk = r#"{"kty":"RSA","alg":"RS384","n":"DKE","e":"EQ"}"#;
        let err = parse_private_jwk(jwk).unwrap_err();
        assert!(matches!(err, AuthError::InvalidKey(_)));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            parse_private_jwk("not json"),
            Err(AuthError::Parse(_))
        ));
    }
}
