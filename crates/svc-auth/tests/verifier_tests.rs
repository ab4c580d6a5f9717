//! Verifier integration tests.
//!
//! Signed tokens are checked against a mocked JWKS endpoint publishing
//! self-signed certificates.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use svc_auth::jwt::MAX_JWT_SIZE_BYTES;
use svc_auth::{AuthError, Verifier, VerifierConfig};
use svc_auth_test_utils::{
    init_test_tracing, ManualClock, MockIdentityProvider, SigningCert, TestTokenBuilder, JWKS_PATH,
};
use tokio::task::JoinSet;
use wiremock::ResponseTemplate;

const RESOURCE: &str = "https://billing.example.com";
const START: i64 = 1_700_000_000;

fn verifier_for(idp: &MockIdentityProvider) -> Verifier {
    Verifier::new(VerifierConfig::new(idp.uri(), RESOURCE.to_string())).unwrap()
}

fn verifier_at(idp: &MockIdentityProvider, clock: Arc<ManualClock>) -> Verifier {
    Verifier::with_parts(
        VerifierConfig::new(idp.uri(), RESOURCE.to_string()),
        reqwest::Client::new(),
        clock,
    )
}

fn token_for(idp: &MockIdentityProvider) -> TestTokenBuilder {
    TestTokenBuilder::new()
        .for_audience(RESOURCE)
        .issued_by(&idp.issuer())
}

// =============================================================================
// Accepted tokens
// =============================================================================

#[tokio::test]
async fn test_verify_ec_signed_token() -> Result<()> {
    init_test_tracing();
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1")?;
    idp.mock_jwks(&[&cert]).await;

    let raw = token_for(&idp)
        .for_subject("svc-a@clients")
        .with_scope("orders:read orders:write")
        .sign(&cert);

    let token = verifier_for(&idp).verify_token(&raw).await?;

    assert_eq!(token.raw, raw);
    assert_eq!(token.claims.sub.as_deref(), Some("svc-a@clients"));
    assert_eq!(token.claims.iss, idp.issuer());
    assert!(token.claims.aud.contains(RESOURCE));
    assert!(token.claims.has_scope("orders:write"));
    Ok(())
}

#[tokio::test]
async fn test_verify_rsa_signed_tokens() -> Result<()> {
    let idp = MockIdentityProvider::start().await;
    let rs256 = SigningCert::rsa("rsa-1")?;
    let ps256 = SigningCert::rsa_with_algorithm("rsa-2", Algorithm::PS256)?;
    idp.mock_jwks(&[&rs256, &ps256]).await;
    let verifier = verifier_for(&idp);

    verifier.verify_token(&token_for(&idp).sign(&rs256)).await?;
    verifier.verify_token(&token_for(&idp).sign(&ps256)).await?;
    Ok(())
}

#[tokio::test]
async fn test_resource_is_one_of_several_audiences() -> Result<()> {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1")?;
    idp.mock_jwks(&[&cert]).await;

    let raw = TestTokenBuilder::new()
        .for_audience("https://other.example.com")
        .for_audience(RESOURCE)
        .issued_by(&idp.issuer())
        .sign(&cert);

    let token = verifier_for(&idp).verify_token(&raw).await?;
    assert_eq!(token.claims.aud.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_tenant_trailing_slash_matches_issuer() -> Result<()> {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1")?;
    idp.mock_jwks(&[&cert]).await;

    let verifier = Verifier::new(VerifierConfig::new(
        format!("{}/", idp.uri()),
        RESOURCE.to_string(),
    ))?;

    verifier.verify_token(&token_for(&idp).sign(&cert)).await?;
    Ok(())
}

#[tokio::test]
async fn test_raw_claims_and_profile_claims() -> Result<()> {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1")?;
    idp.mock_jwks(&[&cert]).await;

    let raw = token_for(&idp)
        .with_claim("https://email", json!("ops@example.com"))
        .with_claim("https://employeeId", json!("E123"))
        .with_claim("tenant_tier", json!(3))
        .sign(&cert);

    let token = verifier_for(&idp).verify_token(&raw).await?;

    assert_eq!(token.claims.email.as_deref(), Some("ops@example.com"));
    assert_eq!(token.claims.employee_id.as_deref(), Some("E123"));
    let raw_claims = token.raw_claims()?;
    assert_eq!(raw_claims["tenant_tier"], 3);
    assert_eq!(raw_claims["aud"], RESOURCE);
    Ok(())
}

#[tokio::test]
async fn test_large_token_with_many_scopes_verifies() -> Result<()> {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1")?;
    idp.mock_jwks(&[&cert]).await;

    let scopes: Vec<String> = (0..500).map(|i| format!("tenant:{i:04}:read")).collect();
    let raw = token_for(&idp).with_scope(&scopes.join(" ")).sign(&cert);
    assert!(raw.len() > 10 * 1024);

    let token = verifier_for(&idp).verify_token(&raw).await?;
    assert_eq!(token.claims.scopes().len(), 500);
    assert!(token.claims.has_scope("tenant:0499:read"));
    Ok(())
}

#[tokio::test]
async fn test_null_scope_verifies_as_empty() -> Result<()> {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1")?;
    idp.mock_jwks(&[&cert]).await;

    let raw = token_for(&idp)
        .with_claim("scope", serde_json::Value::Null)
        .sign(&cert);

    let token = verifier_for(&idp).verify_token(&raw).await?;
    assert!(token.claims.scope.is_empty());
    assert!(token.claims.scopes().is_empty());
    Ok(())
}

// =============================================================================
// Rejected before key resolution
// =============================================================================

#[tokio::test]
async fn test_audience_mismatch_skips_key_fetch() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    MockIdentityProvider::jwks_endpoint()
        .respond_with(MockIdentityProvider::jwks_response(&[&cert]))
        .expect(0)
        .mount(idp.server())
        .await;

    let raw = TestTokenBuilder::new()
        .for_audience("https://other.example.com")
        .issued_by(&idp.issuer())
        .sign(&cert);

    let err = verifier_for(&idp).verify_token(&raw).await.unwrap_err();
    assert_eq!(
        err,
        AuthError::ClaimValidation(format!("missing required audience '{RESOURCE}'"))
    );
}

#[tokio::test]
async fn test_issuer_mismatch_skips_key_fetch() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    MockIdentityProvider::jwks_endpoint()
        .respond_with(MockIdentityProvider::jwks_response(&[&cert]))
        .expect(0)
        .mount(idp.server())
        .await;

    let raw = TestTokenBuilder::new()
        .for_audience(RESOURCE)
        .issued_by("https://attacker.example.com/")
        .sign(&cert);

    let err = verifier_for(&idp).verify_token(&raw).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "bad token: issuer is 'https://attacker.example.com/' when it should be '{}'",
            idp.issuer()
        )
    );
}

#[tokio::test]
async fn test_missing_kid_header() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    idp.mock_jwks(&[&cert]).await;

    let raw = cert.sign_without_kid(&token_for(&idp).build());

    let err = verifier_for(&idp).verify_token(&raw).await.unwrap_err();
    assert_eq!(
        err,
        AuthError::ClaimValidation("unable to get kid header from token".to_string())
    );
    assert_eq!(idp.request_count(JWKS_PATH).await, 0);
}

#[tokio::test]
async fn test_oversized_token_rejected() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();

    let raw = token_for(&idp)
        .with_claim("padding", json!("x".repeat(MAX_JWT_SIZE_BYTES)))
        .sign(&cert);

    let err = verifier_for(&idp).verify_token(&raw).await.unwrap_err();
    assert_eq!(
        err,
        AuthError::Signature("token exceeds maximum size".to_string())
    );
    assert!(err.is_token_rejection());
}

// =============================================================================
// Key resolution
// =============================================================================

#[tokio::test]
async fn test_unknown_kid() {
    let idp = MockIdentityProvider::start().await;
    let published = SigningCert::ec("ec-1").unwrap();
    idp.mock_jwks(&[&published]).await;
    let signer = SigningCert::ec("ec-2").unwrap();

    let err = verifier_for(&idp)
        .verify_token(&token_for(&idp).sign(&signer))
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::KeyResolution("no key for kid: ec-2".to_string()));
    assert_eq!(err.to_string(), "unable to get public key: no key for kid: ec-2");
}

#[tokio::test]
async fn test_key_set_error_status() {
    let idp = MockIdentityProvider::start().await;
    MockIdentityProvider::jwks_endpoint()
        .respond_with(ResponseTemplate::new(503))
        .mount(idp.server())
        .await;
    let cert = SigningCert::ec("ec-1").unwrap();

    let err = verifier_for(&idp)
        .verify_token(&token_for(&idp).sign(&cert))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AuthError::Status {
            status: 503,
            context: "error fetching signing keys".to_string()
        }
    );
    assert!(!err.is_token_rejection());
}

#[tokio::test]
async fn test_malformed_key_set() {
    let idp = MockIdentityProvider::start().await;
    MockIdentityProvider::jwks_endpoint()
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(idp.server())
        .await;
    let cert = SigningCert::ec("ec-1").unwrap();

    let err = verifier_for(&idp)
        .verify_token(&token_for(&idp).sign(&cert))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Decode(_)));
}

#[tokio::test]
async fn test_key_is_cached_across_verifications() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    MockIdentityProvider::jwks_endpoint()
        .respond_with(MockIdentityProvider::jwks_response(&[&cert]))
        .expect(1)
        .mount(idp.server())
        .await;

    let verifier = verifier_for(&idp);
    for _ in 0..3 {
        verifier
            .verify_token(&token_for(&idp).sign(&cert))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_key_cache_lasts_one_day() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    MockIdentityProvider::jwks_endpoint()
        .respond_with(MockIdentityProvider::jwks_response(&[&cert]))
        .expect(2)
        .mount(idp.server())
        .await;

    let clock = Arc::new(ManualClock::new(START));
    let verifier = verifier_at(&idp, Arc::clone(&clock));
    let token_at = |now: i64| {
        TestTokenBuilder::at(now)
            .for_audience(RESOURCE)
            .issued_by(&idp.issuer())
            .sign(&cert)
    };

    verifier.verify_token(&token_at(START)).await.unwrap();

    clock.set(START + 86_399);
    verifier.verify_token(&token_at(START + 86_399)).await.unwrap();
    assert_eq!(idp.request_count(JWKS_PATH).await, 1);

    clock.set(START + 86_400);
    verifier.verify_token(&token_at(START + 86_400)).await.unwrap();
    assert_eq!(idp.request_count(JWKS_PATH).await, 2);
}

#[tokio::test]
async fn test_reset_cache_refetches_keys() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    MockIdentityProvider::jwks_endpoint()
        .respond_with(MockIdentityProvider::jwks_response(&[&cert]))
        .expect(2)
        .mount(idp.server())
        .await;

    let verifier = verifier_for(&idp);
    let raw = token_for(&idp).sign(&cert);
    verifier.verify_token(&raw).await.unwrap();

    verifier.reset_cache().await;
    verifier.verify_token(&raw).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verifications_share_key_fetch() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    MockIdentityProvider::jwks_endpoint()
        .respond_with(
            MockIdentityProvider::jwks_response(&[&cert]).set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(idp.server())
        .await;

    let verifier = verifier_for(&idp);
    let raw = Arc::new(token_for(&idp).sign(&cert));
    let mut tasks = JoinSet::new();
    for _ in 0..50 {
        let verifier = verifier.clone();
        let raw = Arc::clone(&raw);
        tasks.spawn(async move { verifier.verify_token(&raw).await });
    }

    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }
}

// =============================================================================
// Signature and time claims
// =============================================================================

#[tokio::test]
async fn test_signature_from_other_key_rejected() {
    let idp = MockIdentityProvider::start().await;
    let published = SigningCert::ec("ec-1").unwrap();
    idp.mock_jwks(&[&published]).await;
    let impostor = SigningCert::ec("ec-1").unwrap();

    let err = verifier_for(&idp)
        .verify_token(&token_for(&idp).sign(&impostor))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Signature(_)));
}

#[tokio::test]
async fn test_algorithm_not_allowed_for_key() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    idp.mock_jwks(&[&cert]).await;

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("ec-1".to_string());
    let raw = encode(
        &header,
        &token_for(&idp).build(),
        &EncodingKey::from_secret(b"shared-secret"),
    )
    .unwrap();

    let err = verifier_for(&idp).verify_token(&raw).await.unwrap_err();
    assert!(matches!(err, AuthError::Signature(_)));
}

#[tokio::test]
async fn test_expired_token() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    idp.mock_jwks(&[&cert]).await;

    let clock = Arc::new(ManualClock::new(START));
    let verifier = verifier_at(&idp, Arc::clone(&clock));
    let raw = TestTokenBuilder::at(START)
        .for_audience(RESOURCE)
        .issued_by(&idp.issuer())
        .expires_in(60)
        .sign(&cert);

    verifier.verify_token(&raw).await.unwrap();

    clock.set(START + 60);
    let err = verifier.verify_token(&raw).await.unwrap_err();
    assert_eq!(err, AuthError::ClaimValidation("token is expired".to_string()));
}

#[tokio::test]
async fn test_token_without_expiry_rejected() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    idp.mock_jwks(&[&cert]).await;

    let raw = token_for(&idp).without_expiry().sign(&cert);

    let err = verifier_for(&idp).verify_token(&raw).await.unwrap_err();
    assert!(matches!(err, AuthError::ClaimValidation(msg) if msg.contains("exp")));
}

#[tokio::test]
async fn test_not_before_in_future() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    idp.mock_jwks(&[&cert]).await;

    let clock = Arc::new(ManualClock::new(START));
    let raw = TestTokenBuilder::at(START)
        .for_audience(RESOURCE)
        .issued_by(&idp.issuer())
        .not_before(START + 30)
        .sign(&cert);

    let err = verifier_at(&idp, clock).verify_token(&raw).await.unwrap_err();
    assert_eq!(
        err,
        AuthError::ClaimValidation("token is not valid yet".to_string())
    );
}

#[tokio::test]
async fn test_issued_at_beyond_clock_skew() {
    let idp = MockIdentityProvider::start().await;
    let cert = SigningCert::ec("ec-1").unwrap();
    idp.mock_jwks(&[&cert]).await;

    let clock = Arc::new(ManualClock::new(START));
    let verifier = verifier_at(&idp, clock);
    let token_issued = |iat: i64| {
        TestTokenBuilder::at(START)
            .for_audience(RESOURCE)
            .issued_by(&idp.issuer())
            .issued_at(iat)
            .sign(&cert)
    };

    // Default skew is five minutes.
    verifier.verify_token(&token_issued(START + 300)).await.unwrap();
    let err = verifier
        .verify_token(&token_issued(START + 301))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AuthError::ClaimValidation("iat is too far in the future".to_string())
    );
}
