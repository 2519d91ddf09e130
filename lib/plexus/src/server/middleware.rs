//! Server middleware.
//!
//! - [`logging`] - one `http_server_request` span and a completion event per request
//! - [`recover`] - turn a handler panic into an empty 500
//! - [`from_fn`] - middleware from an async closure

use std::borrow::Cow;
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::FutureExt;
use tower::{Layer, Service};
use tracing::{Instrument, Level, info, span, warn};

use super::{HandlerMiddleware, HttpRequest, HttpResponse};
use crate::chain::{Middleware, Next};
use crate::middleware::panic_message;
use crate::{PathTemplate, StatusCode};

type ResponseFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, Infallible>> + Send>>;

/// Log every request at info level, warning on 4xx/5xx.
#[must_use]
pub fn logging() -> HandlerMiddleware {
    Middleware::layer("server_logging", AccessLogLayer)
}

/// Answer 500 when the inner chain panics.
#[must_use]
pub fn recover() -> HandlerMiddleware {
    Middleware::layer("server_recover", CatchPanicLayer)
}

/// Middleware from an async closure; see [`Middleware::from_fn`].
pub fn from_fn<F, Fut>(name: impl Into<Cow<'static, str>>, f: F) -> HandlerMiddleware
where
    F: Fn(HttpRequest, Next<HttpRequest, HttpResponse, Infallible>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Infallible>> + Send + 'static,
{
    Middleware::from_fn(name, f)
}

/// Layer emitting access-log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLogLayer;

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLog<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLog { inner }
    }
}

/// Service emitting access-log events.
#[derive(Debug, Clone)]
pub struct AccessLog<S> {
    inner: S,
}

impl<S> Service<HttpRequest> for AccessLog<S>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = HttpResponse;
    type Error = Infallible;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: HttpRequest) -> Self::Future {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let route = request
            .extensions()
            .get::<PathTemplate>()
            .map_or_else(String::new, ToString::to_string);

        let span = span!(Level::INFO, "http_server_request", %method, %path, %route);

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(
            async move {
                let start = Instant::now();
                let Ok(response) = inner.call(request).await;
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                let status = response.status().as_u16();

                if response.status().is_client_error() || response.status().is_server_error() {
                    warn!(status, elapsed_ms, "request handled with error status");
                } else {
                    info!(status, elapsed_ms, "request handled");
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// Layer converting handler panics into 500 responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatchPanicLayer;

impl<S> Layer<S> for CatchPanicLayer {
    type Service = CatchPanic<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CatchPanic { inner }
    }
}

/// Service converting handler panics into 500 responses.
#[derive(Debug, Clone)]
pub struct CatchPanic<S> {
    inner: S,
}

impl<S> Service<HttpRequest> for CatchPanic<S>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = HttpResponse;
    type Error = Infallible;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: HttpRequest) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let path = request.uri().path().to_string();
        Box::pin(async move {
            match AssertUnwindSafe(async move { inner.call(request).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(%path, panic = %message, "recovered from panic in handler chain");
                    Ok(super::status(StatusCode::INTERNAL_SERVER_ERROR))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use bytes::Bytes;

    use super::*;
    use crate::server::{Mux, handler_fn, text};

    fn get(path: &str) -> HttpRequest {
        http::Request::get(path).body(Bytes::new()).expect("request")
    }

    #[tokio::test]
    async fn recover_turns_panic_into_500() {
        let handler = handler_fn(|request: HttpRequest| async move {
            assert!(request.uri().path() != "/boom", "handler exploded");
            text(StatusCode::OK, "ok")
        });
        let mux = Mux::new()
            .with(recover())
            .get("/boom", handler.clone())
            .and_then(|mux| mux.get("/fine", handler))
            .expect("valid routes")
            .build();

        let response = mux.dispatch(get("/boom")).await;
        check!(response.status() == StatusCode::INTERNAL_SERVER_ERROR);

        let response = mux.dispatch(get("/fine")).await;
        check!(response.status() == StatusCode::OK);
    }

    #[tokio::test]
    async fn logging_passes_responses_through() {
        let mux = Mux::new()
            .with(logging())
            .get("/users/:id", handler_fn(|_| async { text(StatusCode::OK, "user") }))
            .expect("valid route")
            .build();

        let response = mux.dispatch(get("/users/1")).await;
        check!(response.status() == StatusCode::OK);
        check!(response.body().as_ref() == b"user");

        let response = mux.dispatch(get("/nobody")).await;
        check!(response.status() == StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn from_fn_can_short_circuit() {
        let deny = from_fn("deny", |request: HttpRequest, next| async move {
            if request.headers().contains_key("x-token") {
                next.run(request).await
            } else {
                Ok(text(StatusCode::UNAUTHORIZED, "missing token"))
            }
        });
        let mux = Mux::new()
            .route(
                crate::Method::Get,
                "/",
                handler_fn(|_| async { text(StatusCode::OK, "in") }),
                [deny],
            )
            .expect("valid route")
            .build();

        let response = mux.dispatch(get("/")).await;
        check!(response.status() == StatusCode::UNAUTHORIZED);

        let request = http::Request::get("/")
            .header("x-token", "t")
            .body(Bytes::new())
            .expect("request");
        check!(mux.dispatch(request).await.status() == StatusCode::OK);
    }
}
