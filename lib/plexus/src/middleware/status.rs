//! Opt-in conversion of error statuses into [`Error::Http`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};

use crate::{Error, Request, Response, Result};

/// Layer turning 4xx and 5xx responses into errors.
///
/// Without it, any status is returned as a normal response.
#[derive(Debug, Clone, Copy, Default)]
pub struct RaiseForStatusLayer;

impl<S> Layer<S> for RaiseForStatusLayer {
    type Service = RaiseForStatus<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RaiseForStatus { inner }
    }
}

/// Service turning 4xx and 5xx responses into errors.
#[derive(Debug, Clone)]
pub struct RaiseForStatus<S> {
    inner: S,
}

impl<S> Service<Request<Bytes>> for RaiseForStatus<S>
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

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move {
            let response = inner.call(request).await?;
            if response.status() < 400 {
                return Ok(response);
            }

            let reason = http::StatusCode::from_u16(response.status())
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or("unexpected status");
            let body = response.bytes();
            if body.is_empty() {
                Err(Error::http(response.status(), reason))
            } else {
                Err(Error::http_with_body(response.status(), reason, body))
            }
        })
    }
}
