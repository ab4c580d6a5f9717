//! Service-to-service authentication for HTTP APIs.
//!
//! Two halves share one set of primitives:
//!
//! - [`Granter`] obtains OAuth 2.0 client-credentials access tokens from the
//!   identity provider and caches them per resource.
//! - [`Verifier`] verifies inbound bearer tokens against the provider's
//!   published signing keys, enforcing audience and issuer.
//!
//! Both cache their results with an [`cache::ExpiringCache`] and route every
//! cache miss through a [`coalesce::Coalescer`], so concurrent callers asking
//! for the same resource (or key id) share a single network round trip.
//!
//! # Example
//!
//! ```rust,ignore
//! use svc_auth::{Granter, GranterConfig, Verifier, VerifierConfig};
//! use svc_auth::secret::SecretString;
//!
//! let granter = Granter::new(GranterConfig::new(
//!     "https://tenant.example.com".to_string(),
//!     "client-id".to_string(),
//!     SecretString::from("client-secret"),
//! ))?;
//! let token = granter.get_token("https://billing.example.com").await?;
//!
//! let verifier = Verifier::new(VerifierConfig::new(
//!     "https://tenant.example.com".to_string(),
//!     "https://billing.example.com".to_string(),
//! ))?;
//! let parsed = verifier.verify_token(raw).await?;
//! ```

#![warn(clippy::pedantic)]

/// Error type shared by every component
pub mod error;

/// Secret types that prevent accidental logging
pub mod secret;

/// Injectable wall clock
pub mod clock;

/// Expiring key/value cache
pub mod cache;

/// Single-flight request coalescing
pub mod coalesce;

/// Granter and verifier configuration
pub mod config;

/// JWT segment decoding and time-claim checks
pub mod jwt;

/// Token claims and the parsed token type
pub mod claims;

/// JWKS model and certificate key parsing
pub mod jwks;

/// OAuth 2.0 client-credentials token granter
pub mod granter;

/// Bearer token verifier
pub mod verifier;

/// Token suppliers and authorized request builders
pub mod request;

/// Tower transport that authorizes every outbound request
pub mod transport;

/// Scope-checking axum middleware
pub mod middleware;

pub use claims::{AudienceList, Claims, Token};
pub use clock::{Clock, SystemClock};
pub use config::{AuthConfig, GranterConfig, VerifierConfig};
pub use error::{AuthError, Result};
pub use granter::Granter;
pub use request::RequestFactory;
pub use transport::{BearerAuth, BearerAuthLayer};
pub use verifier::{TokenVerifier, Verifier};
