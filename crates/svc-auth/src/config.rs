//! Granter and verifier configuration.
//!
//! Components are configured programmatically through [`GranterConfig`] and
//! [`VerifierConfig`]. [`AuthConfig`] loads both from environment variables
//! for services that want the conventional `AUTH_*` layout. The client secret
//! is redacted in Debug output.

use crate::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use crate::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP request timeout for token and key-set requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout for the HTTP client.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default expiration margin.
pub const DEFAULT_EXPIRATION_MARGIN: Duration = Duration::ZERO;

// =============================================================================
// Granter
// =============================================================================

/// Configuration for a [`crate::Granter`].
///
/// Empty client id, client secret or tenant URL are accepted here and
/// reported as configuration errors when a token is first requested.
#[derive(Clone)]
pub struct GranterConfig {
    /// Identity provider tenant URL, e.g. `https://tenant.example.com`.
    pub tenant_url: String,

    /// OAuth client ID of the calling service.
    pub client_id: String,

    /// OAuth client secret of the calling service.
    pub client_secret: SecretString,

    /// Subtracted from each token's declared expiry before caching.
    pub expiration_margin: Duration,

    /// Request timeout for the default HTTP client.
    pub http_timeout: Duration,
}

impl fmt::Debug for GranterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GranterConfig")
            .field("tenant_url", &self.tenant_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("expiration_margin", &self.expiration_margin)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl GranterConfig {
    /// Create a configuration with default margin and timeout.
    ///
    /// Using an HTTP tenant URL sends the client secret in plain text. Use
    /// [`GranterConfig::new_secure`] to enforce HTTPS.
    #[must_use]
    pub fn new(tenant_url: String, client_id: String, client_secret: SecretString) -> Self {
        Self {
            tenant_url,
            client_id,
            client_secret,
            expiration_margin: DEFAULT_EXPIRATION_MARGIN,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Create a configuration requiring an HTTPS tenant URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InsecureTenantUrl` if the URL doesn't use HTTPS.
    pub fn new_secure(
        tenant_url: String,
        client_id: String,
        client_secret: SecretString,
    ) -> Result<Self, ConfigError> {
        require_https(&tenant_url)?;
        Ok(Self::new(tenant_url, client_id, client_secret))
    }

    /// Set the expiration margin.
    #[must_use]
    pub fn with_expiration_margin(mut self, margin: Duration) -> Self {
        self.expiration_margin = margin;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// Configuration for a [`crate::Verifier`].
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Identity provider tenant URL; the expected issuer is this URL with a
    /// single trailing slash.
    pub tenant_url: String,

    /// Resource URI of the protected service; must appear in every token's
    /// audience.
    pub resource: String,

    /// Subtracted from the fixed signing-key lifetime before caching.
    pub expiration_margin: Duration,

    /// Request timeout for the default HTTP client.
    pub http_timeout: Duration,

    /// Tolerance for `iat` claims in the future.
    pub clock_skew: Duration,
}

impl VerifierConfig {
    /// Create a configuration with default margin, timeout and clock skew.
    #[must_use]
    pub fn new(tenant_url: String, resource: String) -> Self {
        Self {
            tenant_url,
            resource,
            expiration_margin: DEFAULT_EXPIRATION_MARGIN,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    /// Set the expiration margin.
    #[must_use]
    pub fn with_expiration_margin(mut self, margin: Duration) -> Self {
        self.expiration_margin = margin;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set the `iat` clock skew tolerance, capped at [`MAX_CLOCK_SKEW`].
    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew.min(MAX_CLOCK_SKEW);
        self
    }
}

// =============================================================================
// Environment loading
// =============================================================================

/// Errors while loading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid duration for {name}: {reason}")]
    InvalidDuration { name: String, reason: String },

    #[error("Tenant URL must use HTTPS: {0}")]
    InsecureTenantUrl(String),
}

/// Combined configuration loaded from `AUTH_*` environment variables.
///
/// | variable | default |
/// |---|---|
/// | `AUTH_TENANT_URL` | required |
/// | `AUTH_CLIENT_ID` | empty |
/// | `AUTH_CLIENT_SECRET` | empty |
/// | `AUTH_RESOURCE` | empty |
/// | `AUTH_EXPIRATION_MARGIN_SECONDS` | 0 |
/// | `AUTH_HTTP_TIMEOUT_SECONDS` | 30 |
/// | `AUTH_CLOCK_SKEW_SECONDS` | 300 (max 600) |
#[derive(Clone)]
pub struct AuthConfig {
    pub tenant_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub resource: String,
    pub expiration_margin: Duration,
    pub http_timeout: Duration,
    pub clock_skew: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tenant_url", &self.tenant_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("resource", &self.resource)
            .field("expiration_margin", &self.expiration_margin)
            .field("http_timeout", &self.http_timeout)
            .field("clock_skew", &self.clock_skew)
            .finish()
    }
}

impl AuthConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`AuthConfig::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `AUTH_TENANT_URL` is unset and
    /// `ConfigError::InvalidDuration` if a seconds value is not a
    /// non-negative integer or the clock skew exceeds the maximum.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let tenant_url = vars
            .get("AUTH_TENANT_URL")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_TENANT_URL".to_string()))?
            .clone();

        let client_id = vars.get("AUTH_CLIENT_ID").cloned().unwrap_or_default();
        let client_secret = SecretString::from(
            vars.get("AUTH_CLIENT_SECRET")
                .cloned()
                .unwrap_or_default(),
        );
        let resource = vars.get("AUTH_RESOURCE").cloned().unwrap_or_default();

        let expiration_margin = parse_seconds(
            vars,
            "AUTH_EXPIRATION_MARGIN_SECONDS",
            DEFAULT_EXPIRATION_MARGIN,
        )?;
        let http_timeout = parse_seconds(vars, "AUTH_HTTP_TIMEOUT_SECONDS", DEFAULT_HTTP_TIMEOUT)?;
        let clock_skew = parse_seconds(vars, "AUTH_CLOCK_SKEW_SECONDS", DEFAULT_CLOCK_SKEW)?;

        if clock_skew > MAX_CLOCK_SKEW {
            return Err(ConfigError::InvalidDuration {
                name: "AUTH_CLOCK_SKEW_SECONDS".to_string(),
                reason: format!(
                    "must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    clock_skew.as_secs()
                ),
            });
        }

        Ok(Self {
            tenant_url,
            client_id,
            client_secret,
            resource,
            expiration_margin,
            http_timeout,
            clock_skew,
        })
    }

    /// Granter configuration derived from this configuration.
    #[must_use]
    pub fn granter(&self) -> GranterConfig {
        GranterConfig::new(
            self.tenant_url.clone(),
            self.client_id.clone(),
            self.client_secret.clone(),
        )
        .with_expiration_margin(self.expiration_margin)
        .with_http_timeout(self.http_timeout)
    }

    /// Verifier configuration derived from this configuration.
    #[must_use]
    pub fn verifier(&self) -> VerifierConfig {
        VerifierConfig::new(self.tenant_url.clone(), self.resource.clone())
            .with_expiration_margin(self.expiration_margin)
            .with_http_timeout(self.http_timeout)
            .with_clock_skew(self.clock_skew)
    }
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(value) = vars.get(name) else {
        return Ok(default);
    };
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::InvalidDuration {
            name: name.to_string(),
            reason: format!("expected whole seconds, got '{value}': {e}"),
        })
}

fn require_https(url: &str) -> Result<(), ConfigError> {
    if url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InsecureTenantUrl(url.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "AUTH_TENANT_URL".to_string(),
            "https://tenant.example.com".to_string(),
        )])
    }

    #[test]
    fn test_granter_config_defaults() {
        let config = GranterConfig::new(
            "https://tenant.example.com".to_string(),
            "client".to_string(),
            SecretString::from("secret"),
        );

        assert_eq!(config.expiration_margin, DEFAULT_EXPIRATION_MARGIN);
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(DEFAULT_HTTP_TIMEOUT.as_secs(), 30);
    }

    #[test]
    fn test_granter_config_builder() {
        let config = GranterConfig::new(
            "https://tenant.example.com".to_string(),
            "client".to_string(),
            SecretString::from("secret"),
        )
        .with_expiration_margin(Duration::from_secs(60))
        .with_http_timeout(Duration::from_secs(5));

        assert_eq!(config.expiration_margin, Duration::from_secs(60));
        assert_eq!(config.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_granter_config_debug_redacts_secret() {
        let config = GranterConfig::new(
            "https://tenant.example.com".to_string(),
            "client".to_string(),
            SecretString::from("super-secret-value"),
        );

        let debug_str = format!("{config:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("super-secret-value"));
    }

    #[test]
    fn test_new_secure_requires_https() {
        let result = GranterConfig::new_secure(
            "https://tenant.example.com".to_string(),
            "client".to_string(),
            SecretString::from("secret"),
        );
        assert!(result.is_ok());

        let result = GranterConfig::new_secure(
            "http://tenant.example.com".to_string(),
            "client".to_string(),
            SecretString::from("secret"),
        );
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InsecureTenantUrl(_)
        ));
    }

    #[test]
    fn test_verifier_clock_skew_is_capped() {
        let config = VerifierConfig::new(
            "https://tenant.example.com".to_string(),
            "https://svc-b".to_string(),
        )
        .with_clock_skew(Duration::from_secs(3600));

        assert_eq!(config.clock_skew, MAX_CLOCK_SKEW);
    }

    #[test]
    fn test_from_vars_requires_tenant_url() {
        let result = AuthConfig::from_vars(&HashMap::new());
        assert_eq!(
            result.unwrap_err(),
            ConfigError::MissingEnvVar("AUTH_TENANT_URL".to_string())
        );
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = AuthConfig::from_vars(&base_vars()).unwrap();

        assert_eq!(config.tenant_url, "https://tenant.example.com");
        assert!(config.client_id.is_empty());
        assert!(config.client_secret.expose_secret().is_empty());
        assert_eq!(config.expiration_margin, Duration::ZERO);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.clock_skew, DEFAULT_CLOCK_SKEW);
    }

    #[test]
    fn test_from_vars_full() {
        let mut vars = base_vars();
        vars.insert("AUTH_CLIENT_ID".to_string(), "svc-a".to_string());
        vars.insert("AUTH_CLIENT_SECRET".to_string(), "s3cr3t".to_string());
        vars.insert("AUTH_RESOURCE".to_string(), "https://svc-a".to_string());
        vars.insert(
            "AUTH_EXPIRATION_MARGIN_SECONDS".to_string(),
            "60".to_string(),
        );
        vars.insert("AUTH_HTTP_TIMEOUT_SECONDS".to_string(), "10".to_string());
        vars.insert("AUTH_CLOCK_SKEW_SECONDS".to_string(), "120".to_string());

        let config = AuthConfig::from_vars(&vars).unwrap();
        let granter = config.granter();
        let verifier = config.verifier();

        assert_eq!(granter.client_id, "svc-a");
        assert_eq!(granter.client_secret.expose_secret(), "s3cr3t");
        assert_eq!(granter.expiration_margin, Duration::from_secs(60));
        assert_eq!(granter.http_timeout, Duration::from_secs(10));
        assert_eq!(verifier.resource, "https://svc-a");
        assert_eq!(verifier.clock_skew, Duration::from_secs(120));
        assert_eq!(verifier.expiration_margin, Duration::from_secs(60));
    }

    #[test]
    fn test_from_vars_rejects_invalid_margin() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_EXPIRATION_MARGIN_SECONDS".to_string(),
            "-5".to_string(),
        );

        assert!(matches!(
            AuthConfig::from_vars(&vars).unwrap_err(),
            ConfigError::InvalidDuration { name, .. } if name == "AUTH_EXPIRATION_MARGIN_SECONDS"
        ));
    }

    #[test]
    fn test_from_vars_rejects_excessive_clock_skew() {
        let mut vars = base_vars();
        vars.insert("AUTH_CLOCK_SKEW_SECONDS".to_string(), "601".to_string());

        assert!(matches!(
            AuthConfig::from_vars(&vars).unwrap_err(),
            ConfigError::InvalidDuration { name, .. } if name == "AUTH_CLOCK_SKEW_SECONDS"
        ));
    }

    #[test]
    fn test_auth_config_debug_redacts_secret() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_CLIENT_SECRET".to_string(),
            "do-not-log-me".to_string(),
        );
        let config = AuthConfig::from_vars(&vars).unwrap();

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("do-not-log-me"));
    }
}
