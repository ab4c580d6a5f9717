//! # svc-auth Test Utilities
//!
//! Shared test utilities for the `svc-auth` crate.
//!
//! This crate provides:
//! - Signing certificate fixtures (EC and RSA keys with self-signed certs)
//! - Test data builders (`TestTokenBuilder`)
//! - A mock identity provider (`MockIdentityProvider`) over wiremock
//! - A manually advanced clock (`ManualClock`)
//! - Test tracing setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use svc_auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let idp = MockIdentityProvider::start().await;
//!     let cert = SigningCert::ec("key-1").unwrap();
//!     idp.mock_jwks(&[&cert]).await;
//!
//!     let token = TestTokenBuilder::new()
//!         .for_audience("https://svc-b")
//!         .issued_by(&idp.issuer())
//!         .with_scope("orders:read")
//!         .sign(&cert);
//! }
//! ```

pub mod crypto_fixtures;
pub mod manual_clock;
pub mod mock_idp;
pub mod test_tracing;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use manual_clock::*;
pub use mock_idp::*;
pub use test_tracing::*;
pub use token_builders::*;
