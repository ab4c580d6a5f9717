//! Token suppliers and authorized request builders.
//!
//! Both let callers hand a dependency "a way to get a token for R" without
//! passing around a [`Granter`] and a resource string separately.

use crate::error::AuthError;
use crate::granter::Granter;
use crate::secret::{ExposeSecret, SecretString};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Body, Method, Request, Url};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a token supplier from [`Granter::token_fn`].
pub type TokenFuture = Pin<Box<dyn Future<Output = Result<SecretString, AuthError>> + Send>>;

impl Granter {
    /// Zero-argument token supplier for `resource`.
    ///
    /// Each call is equivalent to `granter.get_token(resource)`.
    pub fn token_fn(
        &self,
        resource: impl Into<String>,
    ) -> impl Fn() -> TokenFuture + Clone + Send + Sync + 'static {
        let granter = self.clone();
        let resource: Arc<str> = Arc::from(resource.into());

        move || -> TokenFuture {
            let granter = granter.clone();
            let resource = Arc::clone(&resource);
            Box::pin(async move { granter.get_token(&resource).await })
        }
    }

    /// Request builder that attaches a bearer token for `resource`.
    #[must_use]
    pub fn request_fn(&self, resource: impl Into<String>) -> RequestFactory {
        RequestFactory {
            granter: self.clone(),
            resource: Arc::from(resource.into()),
        }
    }
}

/// Builds requests carrying `Authorization: Bearer <token>` for one resource.
#[derive(Clone)]
pub struct RequestFactory {
    granter: Granter,
    resource: Arc<str>,
}

impl fmt::Debug for RequestFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestFactory")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl RequestFactory {
    /// Resource URI tokens are requested for.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Build a request with the resource's bearer token attached.
    ///
    /// The token is obtained first; no request is built if that fails.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Granter::get_token`], or
    /// `AuthError::Transport` if `url` does not parse.
    pub async fn new_request(
        &self,
        method: Method,
        url: &str,
        body: Option<Body>,
    ) -> Result<Request, AuthError> {
        let token = self.granter.get_token(&self.resource).await?;

        let url = Url::parse(url)
            .map_err(|e| AuthError::Transport(format!("invalid request URL '{url}': {e}")))?;

        let mut request = Request::new(method, url);
        *request.body_mut() = body;
        request
            .headers_mut()
            .insert(AUTHORIZATION, bearer_header(&token)?);

        Ok(request)
    }
}

/// `Bearer <token>` header value, marked sensitive.
pub(crate) fn bearer_header(token: &SecretString) -> Result<HeaderValue, AuthError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|_| AuthError::Transport("access token is not a valid header value".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}
