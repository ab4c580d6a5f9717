//! Tower transport that authorizes every outbound request.
//!
//! [`BearerAuth`] wraps any `Service<reqwest::Request>` (by default the
//! granter's own `reqwest::Client`) and inserts `Authorization: Bearer
//! <token>` for a fixed resource before delegating. If no token can be
//! obtained the request is never sent.
//!
//! ```rust,ignore
//! use svc_auth::BearerAuth;
//!
//! let client = BearerAuth::new(granter, "https://billing.example.com");
//! let request = reqwest::Request::new(reqwest::Method::GET, url);
//! let response = client.execute(request).await?;
//! ```

use crate::error::AuthError;
use crate::granter::Granter;
use crate::request::bearer_header;
use reqwest::header::AUTHORIZATION;
use std::fmt;
use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer producing [`BearerAuth`] services for one resource.
#[derive(Clone)]
pub struct BearerAuthLayer {
    granter: Granter,
    resource: Arc<str>,
}

impl BearerAuthLayer {
    #[must_use]
    pub fn new(granter: Granter, resource: impl Into<String>) -> Self {
        Self {
            granter,
            resource: Arc::from(resource.into()),
        }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuth {
            granter: self.granter.clone(),
            resource: Arc::clone(&self.resource),
            inner,
        }
    }
}

/// Transport that adds the resource's bearer token to every request.
#[derive(Clone)]
pub struct BearerAuth<S = reqwest::Client> {
    granter: Granter,
    resource: Arc<str>,
    inner: S,
}

impl<S> fmt::Debug for BearerAuth<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl BearerAuth<reqwest::Client> {
    /// Wrap the granter's own HTTP client.
    #[must_use]
    pub fn new(granter: Granter, resource: impl Into<String>) -> Self {
        let inner = granter.http_client().clone();
        Self::with_transport(granter, resource, inner)
    }
}

impl<S> BearerAuth<S> {
    /// Wrap a caller-supplied transport.
    #[must_use]
    pub fn with_transport(granter: Granter, resource: impl Into<String>, inner: S) -> Self {
        Self {
            granter,
            resource: Arc::from(resource.into()),
            inner,
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl<S> BearerAuth<S>
where
    S: Service<reqwest::Request> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: fmt::Display,
    S::Future: Send + 'static,
{
    /// Authorize and send one request without `tower::ServiceExt`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Granter::get_token`], or
    /// `AuthError::Transport` if the inner transport fails.
    pub async fn execute(&self, request: reqwest::Request) -> Result<S::Response, AuthError> {
        let mut service = self.clone();
        poll_fn(|cx| service.poll_ready(cx)).await?;
        service.call(request).await
    }
}

impl<S> Service<reqwest::Request> for BearerAuth<S>
where
    S: Service<reqwest::Request> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: fmt::Display,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = AuthError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(|e| AuthError::Transport(e.to_string()))
    }

    fn call(&mut self, mut request: reqwest::Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let granter = self.granter.clone();
        let resource = Arc::clone(&self.resource);

        Box::pin(async move {
            let token = granter.get_token(&resource).await.inspect_err(|e| {
                tracing::debug!(
                    target: "svc_auth.transport",
                    resource = %resource,
                    error = %e,
                    "Request not sent: no token"
                );
            })?;

            request
                .headers_mut()
                .insert(AUTHORIZATION, bearer_header(&token)?);

            // The clone was not driven through poll_ready.
            poll_fn(|cx| inner.poll_ready(cx))
                .await
                .map_err(|e| AuthError::Transport(e.to_string()))?;

            inner.call(request).await.map_err(|e| {
                tracing::debug!(target: "svc_auth.transport", error = %e, "Inner transport failed");
                AuthError::Transport(e.to_string())
            })
        })
    }
}
