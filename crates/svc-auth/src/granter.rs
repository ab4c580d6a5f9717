//! OAuth 2.0 client-credentials token granter.
//!
//! A [`Granter`] obtains access tokens for protected resources from the
//! identity provider's `{tenant}/oauth/token` endpoint and caches them per
//! resource until their declared lifetime (minus the configured margin) runs
//! out.
//!
//! # Features
//!
//! - One token cache per granter, keyed by resource URI
//! - Concurrent misses for the same resource share a single token request
//! - Different resources are fetched independently
//! - Nothing is retried; every failure reaches each caller that waited on it
//!
//! # Example
//!
//! ```rust,ignore
//! use svc_auth::{Granter, GranterConfig};
//! use svc_auth::secret::{ExposeSecret, SecretString};
//!
//! let granter = Granter::new(GranterConfig::new(
//!     "https://tenant.example.com".to_string(),
//!     "my-service".to_string(),
//!     SecretString::from("secret"),
//! ))?;
//!
//! let token = granter.get_token("https://billing.example.com").await?;
//! let header = format!("Bearer {}", token.expose_secret());
//! ```
//!
//! # Security
//!
//! - Client secret and tokens are held as `SecretString` (never logged)
//! - Token acquisition events are logged without values
//! - HTTP timeouts bound how long callers wait on a fetch

use crate::cache::ExpiringCache;
use crate::clock::{Clock, SystemClock};
use crate::coalesce::Coalescer;
use crate::config::{GranterConfig, DEFAULT_CONNECT_TIMEOUT};
use crate::error::AuthError;
use crate::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const TOKEN_PATH: &str = "/oauth/token";

// =============================================================================
// OAuth Wire Types
// =============================================================================

/// Client-credentials grant request body.
#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    audience: &'a str,
}

/// OAuth 2.0 token response from the identity provider.
#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    /// Optional per RFC 6749; a missing value leaves the token uncached.
    #[serde(default)]
    expires_in: i64,
}

impl fmt::Debug for OAuthTokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

// =============================================================================
// Granter
// =============================================================================

struct GranterInner {
    config: GranterConfig,
    http_client: reqwest::Client,
    clock: Arc<dyn Clock>,
    tokens: ExpiringCache<SecretString>,
    in_flight: Coalescer<SecretString>,
}

/// Grants access tokens for protected resources.
///
/// Cloning is cheap; clones share the token cache and in-flight requests.
#[derive(Clone)]
pub struct Granter {
    inner: Arc<GranterInner>,
}

impl fmt::Debug for Granter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Granter")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Granter {
    /// Create a granter with its own HTTP client and the system clock.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: GranterConfig) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_parts(
            config,
            http_client,
            Arc::new(SystemClock),
        ))
    }

    /// Create a granter from an injected HTTP client and clock.
    ///
    /// The client's own timeout settings apply; `config.http_timeout` is
    /// ignored.
    #[must_use]
    pub fn with_parts(
        config: GranterConfig,
        http_client: reqwest::Client,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(GranterInner {
                config,
                http_client,
                clock,
                tokens: ExpiringCache::new(),
                in_flight: Coalescer::new(),
            }),
        }
    }

    /// Get an access token for `resource`.
    ///
    /// Served from the cache while the cached token is valid; otherwise a new
    /// token is requested. Concurrent callers for the same resource share one
    /// request and its outcome.
    ///
    /// # Errors
    ///
    /// - `AuthError::Configuration` - empty resource, or missing client id,
    ///   client secret or tenant URL (no request is sent)
    /// - `AuthError::Transport` - the request failed to complete
    /// - `AuthError::Status` - the provider answered with a non-2xx status
    /// - `AuthError::Decode` - the response body is not a token response
    #[instrument(skip(self))]
    pub async fn get_token(&self, resource: &str) -> Result<SecretString, AuthError> {
        if resource.is_empty() {
            return Err(AuthError::Configuration(
                "resource cannot be empty".to_string(),
            ));
        }

        let inner = &self.inner;
        if let Some(token) = inner.tokens.read(resource, inner.clock.now()).await {
            debug!(target: "svc_auth.granter", resource = %resource, "Token cache hit");
            return Ok(token);
        }

        inner
            .in_flight
            .run(resource, || inner.fetch_token(resource))
            .await
    }

    /// Drop every cached token so the next request per resource refetches.
    pub async fn reset_cache(&self) {
        self.inner.tokens.reset().await;
        debug!(target: "svc_auth.granter", "Token cache reset");
    }

    /// HTTP client used for token requests.
    ///
    /// Also the default transport for [`crate::BearerAuth`].
    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        &self.inner.http_client
    }

    /// Configuration this granter was built from.
    #[must_use]
    pub fn config(&self) -> &GranterConfig {
        &self.inner.config
    }
}

impl GranterInner {
    /// Request a token from the provider and cache it.
    async fn fetch_token(&self, resource: &str) -> Result<SecretString, AuthError> {
        // A fetch for this resource may have completed between the caller's
        // cache miss and joining the coalescer.
        if let Some(token) = self.tokens.read(resource, self.clock.now()).await {
            return Ok(token);
        }

        let config = &self.config;
        if config.client_id.is_empty() || config.client_secret.expose_secret().is_empty() {
            return Err(AuthError::Configuration(
                "client id and client secret cannot be empty".to_string(),
            ));
        }
        if config.tenant_url.is_empty() {
            return Err(AuthError::Configuration(
                "tenant URL cannot be empty".to_string(),
            ));
        }

        let url = format!("{}{TOKEN_PATH}", config.tenant_url.trim_end_matches('/'));
        debug!(
            target: "svc_auth.granter",
            client_id = %config.client_id,
            resource = %resource,
            url = %url,
            "Requesting token"
        );

        let body = TokenRequest {
            grant_type: "client_credentials",
            client_id: &config.client_id,
            client_secret: config.client_secret.expose_secret(),
            audience: resource,
        };

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "svc_auth.granter", resource = %resource, error = %e, "Token request failed");
                AuthError::Transport(format!("unable to fetch token: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "svc_auth.granter",
                resource = %resource,
                status = %status,
                "Token endpoint returned error"
            );
            return Err(AuthError::Status {
                status: status.as_u16(),
                context: "unable to fetch token".to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            warn!(target: "svc_auth.granter", error = %e, "Failed to read token response");
            AuthError::Transport(format!("unable to fetch token: {e}"))
        })?;

        let token_response: OAuthTokenResponse = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(target: "svc_auth.granter", error = %e, "Failed to parse token response");
            AuthError::Decode(format!("bad access token response: {e}"))
        })?;

        let expires_at = self.clock.now().saturating_add(token_response.expires_in);
        let token = SecretString::from(token_response.access_token);
        self.tokens
            .write(resource, token.clone(), expires_at, config.expiration_margin)
            .await;

        debug!(
            target: "svc_auth.granter",
            resource = %resource,
            expires_in_secs = token_response.expires_in,
            "Token acquired"
        );

        Ok(token)
    }
}

// =============================================================================
// Tests
// =============================================================================
