//! Mock identity provider over wiremock.
//!
//! Serves the two endpoints the crate talks to:
//!
//! - `POST /oauth/token` - client-credentials grant
//! - `GET /.well-known/jwks.json` - signing key set
//!
//! The `mock_*` helpers mount canned happy-path responses. For anything else
//! (delays, failures, call-count expectations) start from
//! [`MockIdentityProvider::token_endpoint`] or
//! [`MockIdentityProvider::jwks_endpoint`] and finish the wiremock chain.

use crate::crypto_fixtures::SigningCert;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/oauth/token";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Identity provider stand-in for one test.
pub struct MockIdentityProvider {
    server: MockServer,
}

impl MockIdentityProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Tenant URL to configure granters and verifiers with.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// `iss` value tokens from this tenant carry.
    pub fn issuer(&self) -> String {
        format!("{}/", self.server.uri())
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Matcher chain for the token endpoint.
    pub fn token_endpoint() -> MockBuilder {
        Mock::given(method("POST")).and(path(TOKEN_PATH))
    }

    /// Matcher chain for the JWKS endpoint.
    pub fn jwks_endpoint() -> MockBuilder {
        Mock::given(method("GET")).and(path(JWKS_PATH))
    }

    /// Successful token response body.
    pub fn token_response(access_token: &str, expires_in: i64) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": expires_in,
        }))
    }

    /// Key set publishing `certs`.
    pub fn jwks_response(certs: &[&SigningCert]) -> ResponseTemplate {
        let keys: Vec<Value> = certs.iter().map(|cert| cert.jwk_json()).collect();
        ResponseTemplate::new(200).set_body_json(json!({ "keys": keys }))
    }

    /// Answer every token request with `access_token`.
    pub async fn mock_token(&self, access_token: &str, expires_in: i64) {
        Self::token_endpoint()
            .respond_with(Self::token_response(access_token, expires_in))
            .mount(&self.server)
            .await;
    }

    /// Publish `certs` at the JWKS endpoint.
    pub async fn mock_jwks(&self, certs: &[&SigningCert]) {
        Self::jwks_endpoint()
            .respond_with(Self::jwks_response(certs))
            .mount(&self.server)
            .await;
    }

    /// JSON bodies of every token request received so far.
    pub async fn token_requests(&self) -> Vec<Value> {
        self.received(TOKEN_PATH)
            .await
            .iter()
            .map(|request| request.body_json().expect("token request body is JSON"))
            .collect()
    }

    /// Number of requests received on `route`.
    pub async fn request_count(&self, route: &str) -> usize {
        self.received(route).await.len()
    }

    async fn received(&self, route: &str) -> Vec<wiremock::Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == route)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_requests_are_recorded() {
        let idp = MockIdentityProvider::start().await;
        idp.mock_token("tok1", 60).await;

        reqwest::Client::new()
            .post(format!("{}{TOKEN_PATH}", idp.uri()))
            .json(&json!({"client_id": "a"}))
            .send()
            .await
            .unwrap();

        let requests = idp.token_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["client_id"], "a");
        assert_eq!(idp.request_count(JWKS_PATH).await, 0);
        assert_eq!(idp.issuer(), format!("{}/", idp.uri()));
    }
}
