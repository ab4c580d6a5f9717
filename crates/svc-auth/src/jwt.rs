//! JWT segment decoding and time-claim checks.
//!
//! The verifier inspects a token's header and payload before it knows which
//! key signed it: the audience and issuer are checked and the `kid` is read to
//! pick a signing key. Those reads happen here, WITHOUT signature
//! verification. Nothing decoded by this module may be trusted until
//! [`crate::Verifier`] has checked the signature.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - `iat` values more than the configured skew in the future are rejected

use crate::error::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted JWT size in bytes (64KB).
///
/// Provider tokens carrying many scopes or permissions can exceed 8KB; nothing
/// legitimate approaches this bound. Larger input is rejected before any
/// base64 decoding or signature work.
pub const MAX_JWT_SIZE_BYTES: usize = 64 * 1024;

/// Default tolerance for `iat` claims in the future (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Largest `iat` tolerance a configuration may request (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Structural problems found while reading an unverified token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    #[error("token exceeds maximum size")]
    TokenTooLarge,

    #[error("malformed token")]
    MalformedToken,

    #[error("unable to get kid header from token")]
    MissingKid,

    #[error("iat is too far in the future")]
    IatTooFarInFuture,
}

impl From<JwtValidationError> for AuthError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::TokenTooLarge | JwtValidationError::MalformedToken => {
                AuthError::Signature(err.to_string())
            }
            JwtValidationError::MissingKid | JwtValidationError::IatTooFarInFuture => {
                AuthError::ClaimValidation(err.to_string())
            }
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWT into its three base64url segments.
fn segments(token: &str) -> Result<(&str, &str, &str), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "svc_auth.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) if !header.is_empty() => {
            Ok((header, payload, signature))
        }
        _ => {
            tracing::debug!(target: "svc_auth.jwt", "Token rejected: invalid JWT format");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str, name: &str) -> Result<T, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "svc_auth.jwt", segment = name, error = %e, "Failed to decode JWT base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "svc_auth.jwt", segment = name, error = %e, "Failed to parse JWT JSON");
        JwtValidationError::MalformedToken
    })
}

/// Decode the JWT header as JSON without verifying the signature.
///
/// # Errors
///
/// Returns `TokenTooLarge` or `MalformedToken` if the token is oversized or
/// not three base64url JSON segments.
pub fn decode_header(token: &str) -> Result<serde_json::Value, JwtValidationError> {
    let (header, _, _) = segments(token)?;
    decode_segment(header, "header")
}

/// Decode the JWT payload into `T` without verifying the signature.
///
/// # Errors
///
/// Returns `TokenTooLarge` or `MalformedToken` if the token is oversized,
/// not three segments, or the payload doesn't decode into `T`.
pub fn decode_payload<T: DeserializeOwned>(token: &str) -> Result<T, JwtValidationError> {
    let (_, payload, _) = segments(token)?;
    decode_segment(payload, "payload")
}

/// Extract the `kid` (key ID) header without verifying the signature.
///
/// The value is only good for choosing which published key to verify
/// against. Empty and non-string values are treated as missing.
///
/// # Errors
///
/// Returns `MissingKid` if the header has no usable `kid`, or a structural
/// error from [`decode_header`].
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    let header = decode_header(token)?;

    header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)
}

/// Validate the `iat` claim against an explicit `now` timestamp.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat` is more than `clock_skew` ahead of `now`.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let clock_skew_secs = i64::try_from(clock_skew.min(MAX_CLOCK_SKEW).as_secs()).unwrap_or(0);
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "svc_auth.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
