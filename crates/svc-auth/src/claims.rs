//! Token claims and the parsed token type.
//!
//! [`Claims`] holds the registered claims plus the provider's profile claims,
//! which use URL-style names (`https://email` and friends). Subject and
//! profile fields are redacted in Debug output.

use crate::error::AuthError;
use crate::jwt;
use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// =============================================================================
// AudienceList
// =============================================================================

/// The `aud` claim.
///
/// Accepts either a single string or an array of strings. A single audience
/// is written back as a bare string; any other count is written as an array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudienceList(Vec<String>);

impl AudienceList {
    /// Whether `audience` is one of the entries.
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        self.0.iter().any(|a| a == audience)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for AudienceList {
    fn from(audiences: Vec<String>) -> Self {
        Self(audiences)
    }
}

impl From<&str> for AudienceList {
    fn from(audience: &str) -> Self {
        Self(vec![audience.to_string()])
    }
}

impl Serialize for AudienceList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let [single] = self.0.as_slice() {
            return serializer.serialize_str(single);
        }
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for audience in &self.0 {
            seq.serialize_element(audience)?;
        }
        seq.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AudienceRepr {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for AudienceList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<AudienceRepr>::deserialize(deserializer)? {
            None => Self::default(),
            Some(AudienceRepr::One(audience)) => Self(vec![audience]),
            Some(AudienceRepr::Many(audiences)) => Self(audiences),
        })
    }
}

// =============================================================================
// Claims
// =============================================================================

/// String claim where `null` reads as empty.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Claims carried by a provider-issued access token.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Space-separated scopes granted to this token.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub scope: String,

    #[serde(default, skip_serializing_if = "AudienceList::is_empty")]
    pub aud: AudienceList,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub iss: String,

    /// Subject (client or user id) - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    #[serde(
        rename = "https://email",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<String>,

    #[serde(
        rename = "https://employeeId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub employee_id: Option<String>,

    #[serde(
        rename = "https://firstName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub first_name: Option<String>,

    #[serde(
        rename = "https://lastName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_name: Option<String>,
}

fn redacted(value: Option<&String>) -> Option<&'static str> {
    value.map(|_| "[REDACTED]")
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("scope", &self.scope)
            .field("aud", &self.aud)
            .field("iss", &self.iss)
            .field("sub", &redacted(self.sub.as_ref()))
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("jti", &self.jti)
            .field("email", &redacted(self.email.as_ref()))
            .field("employee_id", &redacted(self.employee_id.as_ref()))
            .field("first_name", &redacted(self.first_name.as_ref()))
            .field("last_name", &redacted(self.last_name.as_ref()))
            .finish()
    }
}

impl Claims {
    /// Check if the token has a specific scope.
    ///
    /// Scopes are space-separated; partial matches do not count.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.split_whitespace().any(|s| s == scope)
    }

    /// Get all scopes as a vector.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split_whitespace().collect()
    }
}

// =============================================================================
// Token
// =============================================================================

/// A verified token: the raw compact string and its typed claims.
#[derive(Clone)]
pub struct Token {
    /// Compact JWT as presented.
    pub raw: String,

    pub claims: Claims,

    raw_claims: OnceLock<serde_json::Map<String, serde_json::Value>>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("raw", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

impl Token {
    #[must_use]
    pub fn new(raw: String, claims: Claims) -> Self {
        Self {
            raw,
            claims,
            raw_claims: OnceLock::new(),
        }
    }

    /// Every payload claim as untyped JSON, including ones [`Claims`] does
    /// not model.
    ///
    /// Decoded from `raw` on first call and memoized. The token was verified
    /// when it was built, so the payload is not re-verified.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signature` if the payload is not a JSON object.
    pub fn raw_claims(&self) -> Result<&serde_json::Map<String, serde_json::Value>, AuthError> {
        if let Some(map) = self.raw_claims.get() {
            return Ok(map);
        }
        let map = jwt::decode_payload(&self.raw)?;
        Ok(self.raw_claims.get_or_init(|| map))
    }
}
