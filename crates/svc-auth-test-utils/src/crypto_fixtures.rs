//! Signing certificate fixtures for testing
//!
//! Each [`SigningCert`] is a private key plus a self-signed X.509 certificate
//! for its public half, which is how the identity provider publishes keys in
//! its JWKS (`x5c`). Tokens signed with the key verify against the JWK built
//! from the certificate.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use rcgen::{CertificateParams, KeyPair};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

/// Subject alternative name on fixture certificates.
const FIXTURE_SUBJECT: &str = "idp.test";

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// Signing key with a self-signed certificate.
#[derive(Clone)]
pub struct SigningCert {
    kid: String,
    algorithm: Algorithm,
    private_key_pem: String,
    cert_der: Vec<u8>,
}

impl std::fmt::Debug for SigningCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCert")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningCert {
    /// P-256 key signing with ES256.
    pub fn ec(kid: &str) -> Result<Self, FixtureError> {
        let certified = rcgen::generate_simple_self_signed(vec![FIXTURE_SUBJECT.to_string()])
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate EC cert: {e}")))?;

        Ok(Self {
            kid: kid.to_string(),
            algorithm: Algorithm::ES256,
            private_key_pem: certified.key_pair.serialize_pem(),
            cert_der: certified.cert.der().to_vec(),
        })
    }

    /// 2048-bit RSA key signing with RS256.
    ///
    /// All RSA fixtures in a test binary share one private key; each call
    /// still gets its own certificate and `kid`.
    pub fn rsa(kid: &str) -> Result<Self, FixtureError> {
        Self::rsa_with_algorithm(kid, Algorithm::RS256)
    }

    /// RSA fixture signing with `algorithm` (any RS* or PS* algorithm).
    pub fn rsa_with_algorithm(kid: &str, algorithm: Algorithm) -> Result<Self, FixtureError> {
        let private_key_pem = shared_rsa_key_pem()?;
        let key_pair = KeyPair::from_pem(private_key_pem)
            .map_err(|e| FixtureError::Crypto(format!("Failed to load RSA key: {e}")))?;
        let cert = CertificateParams::new(vec![FIXTURE_SUBJECT.to_string()])
            .and_then(|params| params.self_signed(&key_pair))
            .map_err(|e| FixtureError::Crypto(format!("Failed to self-sign RSA cert: {e}")))?;

        Ok(Self {
            kid: kid.to_string(),
            algorithm,
            private_key_pem: private_key_pem.to_string(),
            cert_der: cert.der().to_vec(),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Leaf certificate as a standard base64 `x5c` entry.
    pub fn x5c(&self) -> String {
        STANDARD.encode(&self.cert_der)
    }

    /// JWK entry publishing this certificate.
    pub fn jwk_json(&self) -> serde_json::Value {
        let kty = match self.algorithm {
            Algorithm::ES256 | Algorithm::ES384 => "EC",
            _ => "RSA",
        };
        serde_json::json!({
            "kty": kty,
            "kid": self.kid,
            "use": "sig",
            "x5c": [self.x5c()],
        })
    }

    /// Sign `claims` with a header carrying this key's `kid`.
    pub fn sign<T: Serialize>(&self, claims: &T) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with a header that has no `kid`.
    pub fn sign_without_kid<T: Serialize>(&self, claims: &T) -> String {
        self.sign_with_header(&Header::new(self.algorithm), claims)
    }

    /// Sign `claims` with an arbitrary header using this key.
    pub fn sign_with_header<T: Serialize>(&self, header: &Header, claims: &T) -> String {
        encode(header, claims, &self.encoding_key()).expect("Failed to sign token")
    }

    fn encoding_key(&self) -> EncodingKey {
        let pem = self.private_key_pem.as_bytes();
        match self.algorithm {
            Algorithm::ES256 | Algorithm::ES384 => {
                EncodingKey::from_ec_pem(pem).expect("Invalid EC key PEM")
            }
            _ => EncodingKey::from_rsa_pem(pem).expect("Invalid RSA key PEM"),
        }
    }
}

/// PKCS#8 PEM of an RSA key generated once per process.
fn shared_rsa_key_pem() -> Result<&'static str, FixtureError> {
    static PEM: OnceLock<String> = OnceLock::new();

    if let Some(pem) = PEM.get() {
        return Ok(pem);
    }

    let key = RsaPrivateKey::new(&mut OsRng, 2048)
        .map_err(|e| FixtureError::Crypto(format!("Failed to generate RSA key: {e}")))?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| FixtureError::Crypto(format!("Failed to encode RSA key: {e}")))?
        .to_string();

    Ok(PEM.get_or_init(|| pem))
}
