//! JWT validation with a bounded cache in front of signature verification.
//!
//! [`JwtValidator`] is the component applications reach for directly: it
//! wraps a [`JwtConfig`] (signing/verification key material and the expected
//! audience/issuer), a skip-path list, and a [`cache::TokenCache`] so a
//! repeatedly-presented bearer token is checked against the cache before
//! paying for a fresh `jsonwebtoken` decode. It does not itself implement
//! [`Middleware`](crate::Middleware) — applications call
//! [`JwtValidator::validate_request`] from their own middleware and stash the
//! resulting claims wherever their [`ConnectionData`](crate::ConnectionData)
//! type keeps per-connection state, since this crate's `Context` only carries
//! `'static` strings (route parameters and config-style flags), not the
//! owned `String`s a freshly decoded token produces.

mod cache;
mod jwt;

use crate::Request;
use cache::TokenCache;
use std::sync::Arc;
use std::time::Duration;
use std::{error, fmt};

pub use jwt::{JwtClaims, JwtConfig};

/// Extracts the token from a `Authorization: Bearer <token>` header, if
/// present and well-formed.
pub fn bearer_token(request: &Request) -> Option<&str> {
    let header = request.header(b"authorization")?;
    let header = std::str::from_utf8(header).ok()?;
    header.strip_prefix("Bearer ").map(str::trim)
}

/// Errors produced while validating a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header was present at all.
    MissingToken,
    /// An `Authorization` header was present but wasn't `Bearer <token>`
    /// with a non-empty token.
    InvalidAuthHeader,
    /// The token's structure, encoding, or algorithm didn't verify.
    InvalidToken,
    /// The token verified but a standard claim (`aud`, `iss`, `nbf`, a
    /// caller-required claim) failed validation.
    InvalidClaims,
    /// The token verified but its `exp` claim is in the past.
    TokenExpired,
    /// The token's signature didn't match.
    InvalidSignature,
    /// Signing a freshly constructed [`JwtClaims`] failed.
    Encode(String),
}

impl AuthError {
    fn from_jsonwebtoken(source: &jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind as Kind;
        match source.kind() {
            Kind::ExpiredSignature => Self::TokenExpired,
            Kind::InvalidSignature => Self::InvalidSignature,
            Kind::InvalidAudience
            | Kind::InvalidIssuer
            | Kind::InvalidSubject
            | Kind::ImmatureSignature
            | Kind::MissingRequiredClaim(_) => Self::InvalidClaims,
            _ => Self::InvalidToken,
        }
    }

    /// The status every variant maps to unless a caller overrides it.
    pub fn status(&self) -> crate::StatusCode {
        crate::StatusCode::Unauthorized
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "missing authorization header"),
            Self::InvalidAuthHeader => write!(f, "authorization header is not a well-formed bearer token"),
            Self::InvalidToken => write!(f, "token failed to verify"),
            Self::InvalidClaims => write!(f, "token claims failed validation"),
            Self::TokenExpired => write!(f, "token expired"),
            Self::InvalidSignature => write!(f, "token signature did not match"),
            Self::Encode(message) => write!(f, "failed to sign token: {message}"),
        }
    }
}

impl error::Error for AuthError {}

/// Validates bearer tokens against a [`JwtConfig`], caching successes so a
/// repeated token skips signature verification until the cache entry's TTL
/// elapses, and bypassing validation entirely for configured skip paths.
///
/// # Examples
/// ```
/// use shockwave::auth::{JwtConfig, JwtClaims, JwtValidator};
///
/// let validator = JwtValidator::new(JwtConfig::hs256(b"secret"), 1_000);
/// let token = validator.config().encode(&JwtClaims::new("user-1", 3600)).unwrap();
///
/// let claims = validator.validate(&token).unwrap();
/// assert_eq!(claims.sub, "user-1");
/// ```
pub struct JwtValidator {
    config: JwtConfig,
    cache: TokenCache,
    cache_ttl: Duration,
    skip_paths: Vec<String>,
    context_key: String,
    error_handler: Option<Arc<dyn Fn(&AuthError) + Send + Sync>>,
}

impl JwtValidator {
    /// Builds a validator with a cache capped at `cache_capacity` entries
    /// (see [`cache::DEFAULT_CAPACITY`] for the usual default), a 5 minute
    /// cache TTL, no skip paths, and `context_key` `"user"`.
    pub fn new(config: JwtConfig, cache_capacity: usize) -> Self {
        Self {
            config,
            cache: TokenCache::new(cache_capacity),
            cache_ttl: Duration::from_secs(5 * 60),
            skip_paths: Vec::new(),
            context_key: "user".to_owned(),
            error_handler: None,
        }
    }

    /// Overrides how long a freshly verified token stays cached, capped at
    /// the token's own remaining `exp` lifetime regardless of this value.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Adds a path that bypasses validation entirely (matched by exact
    /// equality against the request's path, before the token is even read).
    pub fn with_skip_path(mut self, path: impl Into<String>) -> Self {
        self.skip_paths.push(path.into());
        self
    }

    /// Adds every path in `paths` to the skip list; see
    /// [`with_skip_path`](Self::with_skip_path).
    pub fn with_skip_paths(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.skip_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Overrides the key an application should stash verified claims under
    /// in its own connection/request state (default `"user"`). This crate's
    /// `Context` only holds `'static` strings, so `JwtValidator` cannot
    /// perform the injection itself — callers read this key back out of
    /// [`context_key`](Self::context_key) when wiring claims into their own
    /// `ConnectionData`.
    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = key.into();
        self
    }

    /// Installs a callback invoked with every [`AuthError`]
    /// [`validate_request`](Self::validate_request) produces, before it's
    /// returned to the caller (e.g. for structured logging or metrics).
    pub fn with_error_handler(mut self, handler: impl Fn(&AuthError) + Send + Sync + 'static) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// The signing/verification configuration this validator checks against.
    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// The key callers should store verified claims under; see
    /// [`with_context_key`](Self::with_context_key).
    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    /// Whether `path` is configured to bypass validation.
    pub fn should_skip(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|skip| skip == path)
    }

    /// Validates `token`, consulting the cache before falling back to a full
    /// `jsonwebtoken` decode. A successful fresh decode is cached until
    /// `min(cache_ttl, exp - now)`.
    pub fn validate(&self, token: &str) -> Result<JwtClaims, AuthError> {
        if let Some(claims) = self.cache.get(token) {
            return Ok(claims);
        }

        let claims = self.config.decode(token)?;

        let now = unix_now();
        let remaining = claims.exp.saturating_sub(now);
        let ttl_secs = self.cache_ttl.as_secs().min(remaining);
        self.cache.insert(token.to_owned(), claims.clone(), now + ttl_secs);

        Ok(claims)
    }

    /// Runs the full per-request flow: skip-path bypass, bearer-header
    /// extraction, cache lookup, and fallback verification. Returns `Ok(None)`
    /// for a skipped path (the caller should proceed without claims), and
    /// routes any [`AuthError`] through [`with_error_handler`](Self::with_error_handler)
    /// before returning it.
    pub fn validate_request(&self, request: &Request) -> Result<Option<JwtClaims>, AuthError> {
        let path = std::str::from_utf8(request.url().path()).unwrap_or("");
        if self.should_skip(path) {
            return Ok(None);
        }

        match self.extract_and_validate(request) {
            Ok(claims) => Ok(Some(claims)),
            Err(err) => {
                if let Some(handler) = &self.error_handler {
                    handler(&err);
                }
                Err(err)
            }
        }
    }

    fn extract_and_validate(&self, request: &Request) -> Result<JwtClaims, AuthError> {
        let header = request.header(b"authorization").ok_or(AuthError::MissingToken)?;
        let header = std::str::from_utf8(header).map_err(|_| AuthError::InvalidAuthHeader)?;
        let token = header.strip_prefix("Bearer ").ok_or(AuthError::InvalidAuthHeader)?;
        if token.is_empty() {
            return Err(AuthError::InvalidAuthHeader);
        }

        self.validate(token)
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::ReqLimits;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn validates_and_caches_a_fresh_token() {
        let validator = JwtValidator::new(JwtConfig::hs256(b"secret"), 8);
        let token = validator
            .config()
            .encode(&JwtClaims::new("user-1", 3600))
            .unwrap();

        assert_eq!(validator.validate(&token).unwrap().sub, "user-1");
        assert_eq!(validator.cache.len(), 1);
        // Second call should hit the cache rather than re-decoding.
        assert_eq!(validator.validate(&token).unwrap().sub, "user-1");
    }

    #[test]
    fn rejects_a_malformed_token() {
        let validator = JwtValidator::new(JwtConfig::hs256(b"secret"), 8);
        assert!(matches!(validator.validate("not-a-jwt"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn validate_request_requires_a_bearer_header() {
        let validator = JwtValidator::new(JwtConfig::hs256(b"secret"), 8);
        let request = Request::new(&ReqLimits::default());

        assert!(matches!(
            validator.validate_request(&request),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn skip_paths_bypass_validation_entirely() {
        let validator = JwtValidator::new(JwtConfig::hs256(b"secret"), 8).with_skip_path("/health");
        assert!(validator.should_skip("/health"));
        assert!(!validator.should_skip("/orders"));
    }

    #[test]
    fn context_key_defaults_to_user_and_is_overridable() {
        let validator = JwtValidator::new(JwtConfig::hs256(b"secret"), 8);
        assert_eq!(validator.context_key(), "user");

        let validator = validator.with_context_key("claims");
        assert_eq!(validator.context_key(), "claims");
    }

    #[test]
    fn error_handler_is_invoked_on_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let validator = JwtValidator::new(JwtConfig::hs256(b"secret"), 8)
            .with_error_handler(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            });
        let request = Request::new(&ReqLimits::default());

        assert!(validator.validate_request(&request).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cache_ttl_is_capped_by_remaining_token_lifetime() {
        let validator = JwtValidator::new(JwtConfig::hs256(b"secret"), 8)
            .with_cache_ttl(Duration::from_secs(3600));
        let token = validator
            .config()
            .encode(&JwtClaims::new("user-1", 30))
            .unwrap();

        assert_eq!(validator.validate(&token).unwrap().sub, "user-1");
        // The cache entry must not outlive the token's own 30s `exp`, even
        // though the configured cache_ttl is much longer.
        assert!(validator.cache.get(&token).is_some());
    }
}
