//! Bearer token authentication middleware.
//!
//! Sets `Authorization: Bearer <token>` on every request passing through,
//! replacing any value set further out.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use tower::{Layer, Service};

use crate::{Error, Request, Response, Result};

/// Layer that adds bearer token authentication to requests.
#[derive(Debug, Clone)]
pub struct BearerAuthLayer {
    value: HeaderValue,
}

impl BearerAuthLayer {
    /// Create a new bearer auth layer with the given token.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the token cannot be sent as a header value.
    pub fn new(token: impl AsRef<str>) -> Result<Self> {
        let mut value = HeaderValue::try_from(format!("Bearer {}", token.as_ref()))
            .map_err(|_| Error::configuration("bearer token is not a valid header value"))?;
        value.set_sensitive(true);
        Ok(Self { value })
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuth {
            inner,
            value: self.value.clone(),
        }
    }
}

/// Service that adds bearer token authentication to requests.
#[derive(Debug, Clone)]
pub struct BearerAuth<S> {
    inner: S,
    value: HeaderValue,
}

impl<S> Service<Request<Bytes>> for BearerAuth<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Bytes>) -> Self::Future {
        request.headers_mut().insert(AUTHORIZATION, self.value.clone());

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(request).await })
    }
}
