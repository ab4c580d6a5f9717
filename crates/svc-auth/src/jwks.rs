//! JWKS model and certificate key parsing.
//!
//! The identity provider publishes its signing keys at
//! `{tenant}/.well-known/jwks.json`. Each entry carries an X.509 certificate
//! chain (`x5c`, standard base64 DER); the first certificate holds the public
//! key used to verify tokens with the matching `kid`.
//!
//! Supported key types:
//!
//! - RSA (`rsaEncryption`): RS256/384/512 and PS256/384/512
//! - EC P-256 and P-384 (`id-ecPublicKey`): ES256 and ES384

use crate::error::AuthError;
use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::fmt;
use x509_cert::der::Decode;
use x509_cert::spki::ObjectIdentifier;
use x509_cert::Certificate;

/// rsaEncryption (RFC 8017)
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// id-ecPublicKey (RFC 5480)
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Uncompressed SEC1 point lengths.
const P256_POINT_LEN: usize = 65;
const P384_POINT_LEN: usize = 97;

const RSA_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: String,

    /// Key type ("RSA" or "EC"). Informational; the certificate decides.
    #[serde(default)]
    pub kty: Option<String>,

    /// Certificate chain, leaf first, standard base64 DER.
    #[serde(default)]
    pub x5c: Vec<String>,
}

/// JWKS response from the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl JwksResponse {
    /// Resolve the verification key for `kid`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeyResolution` if no entry matches `kid` or the
    /// matching entry's certificate cannot be used.
    pub fn verification_key(&self, kid: &str) -> Result<VerificationKey, AuthError> {
        let jwk = self
            .keys
            .iter()
            .find(|key| key.kid == kid)
            .ok_or_else(|| AuthError::KeyResolution(format!("no key for kid: {kid}")))?;

        jwk.verification_key()
    }
}

/// A parsed public key and the algorithms it may verify.
#[derive(Clone)]
pub struct VerificationKey {
    pub decoding_key: DecodingKey,
    pub algorithms: Vec<Algorithm>,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("algorithms", &self.algorithms)
            .finish_non_exhaustive()
    }
}

impl Jwk {
    /// Parse the leaf certificate of `x5c` into a verification key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeyResolution` if the chain is empty, the
    /// certificate does not decode, or its key type is unsupported.
    pub fn verification_key(&self) -> Result<VerificationKey, AuthError> {
        let kid = &self.kid;
        let leaf = self
            .x5c
            .first()
            .ok_or_else(|| AuthError::KeyResolution(format!("missing certificate chain for kid: {kid}")))?;

        let der = STANDARD.decode(leaf.trim()).map_err(|e| {
            tracing::debug!(target: "svc_auth.jwks", kid = %kid, error = %e, "Invalid x5c base64");
            AuthError::KeyResolution(format!("invalid certificate encoding for kid: {kid}"))
        })?;

        let cert = Certificate::from_der(&der).map_err(|e| {
            tracing::debug!(target: "svc_auth.jwks", kid = %kid, error = %e, "Invalid x5c certificate");
            AuthError::KeyResolution(format!("invalid certificate for kid: {kid}"))
        })?;

        key_from_certificate(&cert)
            .ok_or_else(|| AuthError::KeyResolution(format!("unsupported key type for kid: {kid}")))
    }
}

fn key_from_certificate(cert: &Certificate) -> Option<VerificationKey> {
    let spki = &cert.tbs_certificate.subject_public_key_info;
    let key_bytes = spki.subject_public_key.as_bytes()?;
    let oid = spki.algorithm.oid;

    if oid == RSA_ENCRYPTION {
        return Some(VerificationKey {
            decoding_key: DecodingKey::from_rsa_der(key_bytes),
            algorithms: RSA_ALGORITHMS.to_vec(),
        });
    }

    if oid == EC_PUBLIC_KEY {
        let algorithm = match key_bytes.len() {
            P256_POINT_LEN => Algorithm::ES256,
            P384_POINT_LEN => Algorithm::ES384,
            other => {
                tracing::debug!(target: "svc_auth.jwks", point_len = other, "Unsupported EC curve");
                return None;
            }
        };
        return Some(VerificationKey {
            decoding_key: DecodingKey::from_ec_der(key_bytes),
            algorithms: vec![algorithm],
        });
    }

    tracing::debug!(target: "svc_auth.jwks", oid = %oid, "Unsupported public key algorithm");
    None
}
