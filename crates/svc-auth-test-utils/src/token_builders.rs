//! Builder patterns for test data construction
//!
//! Provides a fluent API for identity-provider style access tokens.

use crate::crypto_fixtures::SigningCert;
use chrono::Utc;
use serde_json::{json, Map, Value};

/// Builder for test access token claims
///
/// Times are Unix seconds relative to the builder's `now`, which defaults to
/// the wall clock; use [`TestTokenBuilder::at`] to line tokens up with a
/// `ManualClock`.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_audience("https://billing.example.com")
///     .issued_by("https://tenant.example.com/")
///     .with_scope("orders:read orders:write")
///     .expires_in(3600)
///     .sign(&cert);
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    now: i64,
    aud: Vec<String>,
    iss: String,
    sub: String,
    scope: String,
    exp: Option<i64>,
    iat: i64,
    nbf: Option<i64>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        Self::at(Utc::now().timestamp())
    }

    /// Builder whose relative times are based on `now`.
    pub fn at(now: i64) -> Self {
        Self {
            now,
            aud: Vec::new(),
            iss: String::new(),
            sub: "test-client@clients".to_string(),
            scope: String::new(),
            exp: Some(now + 3600),
            iat: now,
            nbf: None,
            extra: Map::new(),
        }
    }

    /// Add an audience (resource URI)
    pub fn for_audience(mut self, audience: &str) -> Self {
        self.aud.push(audience.to_string());
        self
    }

    /// Set the issuer
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Set the subject (client)
    pub fn for_subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the scope (space-separated)
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    /// Set expiration in seconds from `now` (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some(self.now + seconds);
        self
    }

    /// Omit the `exp` claim
    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set not-before timestamp
    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.nbf = Some(timestamp);
        self
    }

    /// Add any other claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = json!({
            "iss": self.iss,
            "sub": self.sub,
            "scope": self.scope,
            "iat": self.iat,
        });
        let object = claims.as_object_mut().expect("claims are an object");

        match self.aud.as_slice() {
            [] => {}
            [single] => {
                object.insert("aud".to_string(), json!(single));
            }
            many => {
                object.insert("aud".to_string(), json!(many));
            }
        }
        if let Some(exp) = self.exp {
            object.insert("exp".to_string(), json!(exp));
        }
        if let Some(nbf) = self.nbf {
            object.insert("nbf".to_string(), json!(nbf));
        }
        object.extend(self.extra);

        claims
    }

    /// Build and sign with `cert`
    pub fn sign(self, cert: &SigningCert) -> String {
        cert.sign(&self.build())
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
