//! Bearer token verifier.
//!
//! A [`Verifier`] checks tokens presented to a protected service. Audience and
//! issuer are checked on the unverified payload first, so tokens meant for
//! another service or tenant are rejected without touching the network. Only
//! then is the signing key resolved by `kid` and the signature verified.
//!
//! Signing keys come from `{tenant}/.well-known/jwks.json` and are cached per
//! `kid` for 24 hours minus the configured margin. Concurrent misses for the
//! same `kid` share one key-set request.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Algorithms are pinned to the key family of the signing certificate
//! - `exp` is required; `nbf` and `iat` are checked when present

use crate::cache::ExpiringCache;
use crate::claims::{Claims, Token};
use crate::clock::{Clock, SystemClock};
use crate::coalesce::Coalescer;
use crate::config::{VerifierConfig, DEFAULT_CONNECT_TIMEOUT};
use crate::error::AuthError;
use crate::jwks::{JwksResponse, VerificationKey};
use crate::jwt;
use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Lifetime of a cached signing key before the margin is applied.
pub const KEY_CACHE_LIFETIME: Duration = Duration::from_secs(86_400);

const JWKS_PATH: &str = "/.well-known/jwks.json";

// =============================================================================
// TokenVerifier
// =============================================================================

/// "Verify this raw token and return its claims."
///
/// The scope middleware depends only on this trait, so handlers can be
/// tested against a substitute without an identity provider.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `raw` and return the parsed token.
    async fn verify_token(&self, raw: &str) -> Result<Token, AuthError>;
}

// =============================================================================
// Verifier
// =============================================================================

struct VerifierInner {
    config: VerifierConfig,
    http_client: reqwest::Client,
    clock: Arc<dyn Clock>,
    keys: ExpiringCache<VerificationKey>,
    in_flight: Coalescer<VerificationKey>,
}

/// Verifies bearer tokens issued by the identity provider.
///
/// Cloning is cheap; clones share the key cache.
#[derive(Clone)]
pub struct Verifier {
    inner: Arc<VerifierInner>,
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Verifier {
    /// Create a verifier with its own HTTP client and the system clock.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: VerifierConfig) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_parts(config, http_client, Arc::new(SystemClock)))
    }

    /// Create a verifier from an injected HTTP client and clock.
    #[must_use]
    pub fn with_parts(
        config: VerifierConfig,
        http_client: reqwest::Client,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(VerifierInner {
                config,
                http_client,
                clock,
                keys: ExpiringCache::new(),
                in_flight: Coalescer::new(),
            }),
        }
    }

    /// Verify a raw bearer token.
    ///
    /// # Errors
    ///
    /// - `AuthError::Configuration` - tenant URL or resource not configured
    /// - `AuthError::ClaimValidation` - audience, issuer, `kid` header or a
    ///   time claim is not acceptable
    /// - `AuthError::KeyResolution` - no usable key is published for the `kid`
    /// - `AuthError::Transport`, `AuthError::Status`, `AuthError::Decode` -
    ///   the key set could not be fetched
    /// - `AuthError::Signature` - malformed token or bad signature
    #[instrument(skip_all)]
    pub async fn verify_token(&self, raw: &str) -> Result<Token, AuthError> {
        let inner = &self.inner;
        let config = &inner.config;
        if config.tenant_url.is_empty() {
            return Err(AuthError::Configuration(
                "tenant URL cannot be empty".to_string(),
            ));
        }
        if config.resource.is_empty() {
            return Err(AuthError::Configuration(
                "resource cannot be empty".to_string(),
            ));
        }

        // Both segments must decode before any claim is inspected.
        jwt::decode_header(raw)?;
        let unverified: Claims = jwt::decode_payload(raw)?;

        if !unverified.aud.contains(&config.resource) {
            debug!(target: "svc_auth.verifier", resource = %config.resource, "Token rejected: audience mismatch");
            return Err(AuthError::ClaimValidation(format!(
                "missing required audience '{}'",
                config.resource
            )));
        }

        let issuer = inner.issuer();
        if unverified.iss.is_empty() || unverified.iss != issuer {
            debug!(target: "svc_auth.verifier", iss = %unverified.iss, "Token rejected: issuer mismatch");
            return Err(AuthError::ClaimValidation(format!(
                "issuer is '{}' when it should be '{issuer}'",
                unverified.iss
            )));
        }

        let kid = jwt::extract_kid(raw)?;
        let key = inner.resolve_key(&kid).await?;

        let claims = decode::<Claims>(raw, &key.decoding_key, &validation_for(&key))
            .map_err(|e| map_jwt_error(&e))?
            .claims;

        inner.validate_time_claims(&claims)?;

        debug!(target: "svc_auth.verifier", kid = %kid, "Token verified");
        Ok(Token::new(raw.to_string(), claims))
    }

    /// Drop every cached signing key so the next verification refetches.
    pub async fn reset_cache(&self) {
        self.inner.keys.reset().await;
        debug!(target: "svc_auth.verifier", "Key cache reset");
    }

    /// Configuration this verifier was built from.
    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.inner.config
    }
}

#[async_trait]
impl TokenVerifier for Verifier {
    async fn verify_token(&self, raw: &str) -> Result<Token, AuthError> {
        Verifier::verify_token(self, raw).await
    }
}

impl VerifierInner {
    fn tenant(&self) -> &str {
        self.config.tenant_url.trim_end_matches('/')
    }

    /// Expected `iss`: the tenant URL with exactly one trailing slash.
    fn issuer(&self) -> String {
        format!("{}/", self.tenant())
    }

    async fn resolve_key(&self, kid: &str) -> Result<VerificationKey, AuthError> {
        if let Some(key) = self.keys.read(kid, self.clock.now()).await {
            debug!(target: "svc_auth.verifier", kid = %kid, "Key cache hit");
            return Ok(key);
        }

        self.in_flight.run(kid, || self.fetch_key(kid)).await
    }

    /// Fetch the key set, resolve `kid` and cache the key.
    #[instrument(skip(self))]
    async fn fetch_key(&self, kid: &str) -> Result<VerificationKey, AuthError> {
        if let Some(key) = self.keys.read(kid, self.clock.now()).await {
            return Ok(key);
        }

        let url = format!("{}{JWKS_PATH}", self.tenant());
        debug!(target: "svc_auth.jwks", url = %url, kid = %kid, "Fetching signing keys");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            warn!(target: "svc_auth.jwks", error = %e, "Key set request failed");
            AuthError::Transport(format!("error fetching signing keys: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target: "svc_auth.jwks", status = %status, "Key set endpoint returned error");
            return Err(AuthError::Status {
                status: status.as_u16(),
                context: "error fetching signing keys".to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            warn!(target: "svc_auth.jwks", error = %e, "Failed to read key set");
            AuthError::Transport(format!("error fetching signing keys: {e}"))
        })?;

        let jwks: JwksResponse = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(target: "svc_auth.jwks", error = %e, "Failed to parse key set");
            AuthError::Decode(format!("bad key set response: {e}"))
        })?;

        let key = jwks.verification_key(kid).inspect_err(|e| {
            warn!(target: "svc_auth.jwks", kid = %kid, error = %e, "Signing key not usable");
        })?;

        let lifetime = i64::try_from(KEY_CACHE_LIFETIME.as_secs()).unwrap_or(i64::MAX);
        let expires_at = self.clock.now().saturating_add(lifetime);
        self.keys
            .write(kid, key.clone(), expires_at, self.config.expiration_margin)
            .await;

        info!(
            target: "svc_auth.jwks",
            kid = %kid,
            key_count = jwks.keys.len(),
            "Signing key cached"
        );

        Ok(key)
    }

    fn validate_time_claims(&self, claims: &Claims) -> Result<(), AuthError> {
        let now = self.clock.now();

        if let Some(exp) = claims.exp {
            if now >= exp {
                return Err(AuthError::ClaimValidation("token is expired".to_string()));
            }
        }

        if let Some(nbf) = claims.nbf {
            if nbf > now {
                return Err(AuthError::ClaimValidation(
                    "token is not valid yet".to_string(),
                ));
            }
        }

        if let Some(iat) = claims.iat {
            jwt::validate_iat_at(iat, self.config.clock_skew, now)?;
        }

        Ok(())
    }
}

/// Signature-only validation; time claims are checked against the injected
/// clock afterwards, audience and issuer were checked before key resolution.
fn validation_for(key: &VerificationKey) -> Validation {
    let mut validation = Validation::new(
        key.algorithms
            .first()
            .copied()
            .unwrap_or(Algorithm::RS256),
    );
    validation.algorithms.clone_from(&key.algorithms);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);
    validation
}

fn map_jwt_error(err: &jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::ClaimValidation(format!("missing required claim '{claim}'"))
        }
        ErrorKind::ExpiredSignature => AuthError::ClaimValidation("token is expired".to_string()),
        ErrorKind::ImmatureSignature => {
            AuthError::ClaimValidation("token is not valid yet".to_string())
        }
        _ => {
            debug!(target: "svc_auth.verifier", error = %err, "Token signature verification failed");
            AuthError::Signature(err.to_string())
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
