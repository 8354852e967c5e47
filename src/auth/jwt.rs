//! Raw token encode/validate, independent of caching.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::AuthError;

/// Claims carried by a bearer token.
///
/// `sub`, `exp`, and `iat` are the fields the validator itself relies on;
/// anything else the issuer adds rides along via `extra` (e.g. a `role` or
/// `tenant` claim a handler reads back out of [`Context`](crate::Context)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject — conventionally a user or service ID.
    pub sub: String,
    /// Expiration time, Unix seconds.
    pub exp: u64,
    /// Issued-at time, Unix seconds.
    pub iat: u64,
    /// Any additional claims the token carries.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JwtClaims {
    /// Builds a fresh claim set for `subject`, expiring `ttl_secs` from now.
    pub fn new(subject: impl Into<String>, ttl_secs: u64) -> Self {
        let now = unix_now();
        Self {
            sub: subject.into(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
            extra: serde_json::Map::new(),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Configuration for signing and validating tokens.
///
/// Held by [`super::JwtValidator`] for the lifetime of the server; cheap to
/// clone since the key material is reference-counted internally by
/// `jsonwebtoken`.
#[derive(Clone)]
pub struct JwtConfig {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Clock skew tolerance applied to `exp`/`nbf` checks, in seconds.
    pub leeway_secs: u64,
    /// Expected `aud` claim; `None` disables audience validation.
    pub audience: Option<String>,
    /// Expected `iss` claim; `None` disables issuer validation.
    pub issuer: Option<String>,
}

impl JwtConfig {
    fn with_algorithm(algorithm: Algorithm, secret: &[u8]) -> Self {
        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            leeway_secs: 60,
            audience: None,
            issuer: None,
        }
    }

    /// Builds a config for HMAC-SHA256 (`HS256`) signing with a shared secret.
    pub fn hs256(secret: &[u8]) -> Self {
        Self::with_algorithm(Algorithm::HS256, secret)
    }

    /// Builds a config for HMAC-SHA384 (`HS384`) signing with a shared secret.
    pub fn hs384(secret: &[u8]) -> Self {
        Self::with_algorithm(Algorithm::HS384, secret)
    }

    /// Builds a config for HMAC-SHA512 (`HS512`) signing with a shared secret.
    pub fn hs512(secret: &[u8]) -> Self {
        Self::with_algorithm(Algorithm::HS512, secret)
    }

    /// The HMAC variant this config signs and verifies with.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Restricts accepted tokens to the given audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Restricts accepted tokens to the given issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Overrides the default 60 second clock-skew leeway.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = self.leeway_secs;
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss]);
        }
        validation
    }

    /// Signs `claims` into a compact JWT.
    pub fn encode(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|source| AuthError::Encode(source.to_string()))
    }

    /// Verifies signature, expiry, and configured audience/issuer, returning
    /// the decoded claims on success.
    pub fn decode(&self, token: &str) -> Result<JwtClaims, AuthError> {
        decode::<JwtClaims>(token, &self.decoding_key, &self.validation())
            .map(|data| data.claims)
            .map_err(AuthError::from_jsonwebtoken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_freshly_signed_token() {
        let config = JwtConfig::hs256(b"test-secret");
        let claims = JwtClaims::new("user-1", 3600);

        let token = config.encode(&claims).unwrap();
        let decoded = config.decode(&token).unwrap();

        assert_eq!(decoded.sub, "user-1");
    }

    #[test]
    fn rejects_a_token_signed_with_a_different_secret() {
        let signer = JwtConfig::hs256(b"signer-secret");
        let verifier = JwtConfig::hs256(b"other-secret");
        let token = signer.encode(&JwtClaims::new("user-1", 3600)).unwrap();

        assert!(verifier.decode(&token).is_err());
    }

    #[test]
    fn rejects_an_expired_token() {
        let config = JwtConfig::hs256(b"test-secret").with_leeway(0);
        let mut claims = JwtClaims::new("user-1", 0);
        claims.exp = unix_now().saturating_sub(120);

        let token = config.encode(&claims).unwrap();
        assert!(matches!(config.decode(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn hs384_and_hs512_round_trip() {
        for config in [JwtConfig::hs384(b"test-secret"), JwtConfig::hs512(b"test-secret")] {
            let claims = JwtClaims::new("user-1", 3600);
            let token = config.encode(&claims).unwrap();
            assert_eq!(config.decode(&token).unwrap().sub, "user-1");
        }
    }

    #[test]
    fn mismatched_algorithm_is_rejected() {
        let signer = JwtConfig::hs512(b"test-secret");
        let verifier = JwtConfig::hs256(b"test-secret");
        let token = signer.encode(&JwtClaims::new("user-1", 3600)).unwrap();

        assert!(verifier.decode(&token).is_err());
    }

    #[test]
    fn rejects_an_unexpected_audience() {
        let config = JwtConfig::hs256(b"test-secret").with_audience("orders-api");
        let token = config.encode(&JwtClaims::new("user-1", 3600)).unwrap();

        assert!(config.decode(&token).is_err());
    }
}
