//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`]. The client secret and every issued access token are
//! held as [`SecretString`]: `Debug` prints a redaction marker and the value
//! is zeroized on drop. Reading the value requires an explicit
//! [`ExposeSecret::expose_secret`] call, which keeps the places that put a
//! token on the wire easy to audit.
//!
//! ```rust
//! use svc_auth::secret::{ExposeSecret, SecretString};
//!
//! let token = SecretString::from("eyJhbGciOi...");
//! assert!(!format!("{token:?}").contains("eyJ"));
//! assert_eq!(token.expose_secret(), "eyJhbGciOi...");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
