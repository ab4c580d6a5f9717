//! Error types for token granting and verification.

use thiserror::Error;

/// Errors returned by the granter, the verifier and their adapters.
///
/// The type is `Clone` because a coalesced fetch hands the same outcome to
/// every caller that waited on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or invalid configuration, detected before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Request construction or transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The identity provider answered with a non-2xx status.
    #[error("{context}: received {status} status code")]
    Status {
        /// HTTP status code of the response.
        status: u16,
        /// What was being fetched.
        context: String,
    },

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// No usable signing key could be resolved for the token's key id.
    #[error("unable to get public key: {0}")]
    KeyResolution(String),

    /// Audience, issuer, key id header or time claims are not acceptable.
    #[error("bad token: {0}")]
    ClaimValidation(String),

    /// Signature verification failed or the token is structurally invalid.
    #[error("invalid token: {0}")]
    Signature(String),
}

impl AuthError {
    /// Returns the HTTP status code carried by a [`AuthError::Status`] error.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AuthError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error means the presented token must be rejected.
    ///
    /// Configuration, transport, status and decode errors describe a failure
    /// on the verifying side rather than a bad token.
    #[must_use]
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::KeyResolution(_) | AuthError::ClaimValidation(_) | AuthError::Signature(_)
        )
    }
}

/// Result type alias using `AuthError`
pub type Result<T> = std::result::Result<T, AuthError>;
