//! Scope-checking middleware for protected routes.
//!
//! [`require_scope`] extracts the bearer token from the `Authorization`
//! header, verifies it through a [`TokenVerifier`] and checks the token's
//! space-separated `scope` claim for the route's required permission.
//!
//! # Response
//!
//! - 401 Unauthorized with `WWW-Authenticate` if the token is missing or fails
//!   verification for any reason
//! - 403 Forbidden if the token is valid but lacks the scope
//! - Otherwise the verified [`Token`] is stored in request extensions and the
//!   next handler runs
//!
//! ```rust,ignore
//! use axum::{middleware, routing::get, Router};
//! use svc_auth::middleware::{require_scope, ScopeState};
//!
//! let state = Arc::new(ScopeState::new(Arc::new(verifier), "orders:read"));
//! let app = Router::new()
//!     .route("/orders", get(list_orders))
//!     .layer(middleware::from_fn_with_state(state, require_scope));
//! ```

use crate::claims::Token;
use crate::verifier::TokenVerifier;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

const WWW_AUTHENTICATE_INVALID_TOKEN: &str = "Bearer error=\"invalid_token\"";

/// State for [`require_scope`].
#[derive(Clone)]
pub struct ScopeState {
    pub verifier: Arc<dyn TokenVerifier>,

    /// Permission that must appear in the token's `scope` claim.
    pub scope: String,
}

impl fmt::Debug for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeState")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ScopeState {
    #[must_use]
    pub fn new(verifier: Arc<dyn TokenVerifier>, scope: impl Into<String>) -> Self {
        Self {
            verifier,
            scope: scope.into(),
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// Missing, malformed or unverifiable token.
    Unauthenticated,

    /// Valid token without the required scope.
    Forbidden { scope: String },
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthRejection::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "The access token is invalid or expired".to_string(),
            ),
            AuthRejection::Forbidden { scope } => (
                StatusCode::FORBIDDEN,
                "INSUFFICIENT_SCOPE",
                format!("Token is missing required scope '{scope}'"),
            ),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE_INVALID_TOKEN),
            );
        }

        response
    }
}

/// Extract the bearer token from the Authorization header.
fn extract_bearer_token(req: &Request) -> Result<&str, AuthRejection> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "svc_auth.middleware", "Missing Authorization header");
            AuthRejection::Unauthenticated
        })?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "svc_auth.middleware", "Invalid Authorization header format");
            AuthRejection::Unauthenticated
        })
}

/// Require a verified token carrying `state.scope`.
#[instrument(skip_all, name = "svc_auth.middleware.require_scope")]
pub async fn require_scope(
    State(state): State<Arc<ScopeState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let raw = extract_bearer_token(&req)?.to_string();

    let token = state.verifier.verify_token(&raw).await.map_err(|e| {
        if e.is_token_rejection() {
            tracing::debug!(target: "svc_auth.middleware", error = %e, "Token rejected");
        } else {
            tracing::warn!(target: "svc_auth.middleware", error = %e, "Token could not be verified");
        }
        AuthRejection::Unauthenticated
    })?;

    if !token.claims.has_scope(&state.scope) {
        tracing::debug!(
            target: "svc_auth.middleware",
            required = %state.scope,
            "Token missing required scope"
        );
        return Err(AuthRejection::Forbidden {
            scope: state.scope.clone(),
        });
    }

    req.extensions_mut().insert(token);
    Ok(next.run(req).await)
}

/// Access to the verified token stored by [`require_scope`].
pub trait TokenExt {
    /// `None` if the middleware did not run for this request.
    fn auth_token(&self) -> Option<&Token>;
}

impl<B> TokenExt for axum::http::Request<B> {
    fn auth_token(&self) -> Option<&Token> {
        self.extensions().get::<Token>()
    }
}
