//! Inbound request routing.
//!
//! Handlers are Tower services over buffered `http` requests and responses
//! that never fail; a failure is a response. [`Mux`] registers them by method
//! and pattern, wraps them with global and per-route [`HandlerMiddleware`] and
//! builds a [`MuxService`] that any hyper or Tower based server can drive.
//!
//! # Example
//!
//! ```ignore
//! use plexus::server::{self, Mux, RequestExt, handler_fn};
//!
//! let service = Mux::new()
//!     .with(server::middleware::logging())
//!     .get("/users/list", handler_fn(|_req| async { server::text(StatusCode::OK, "all") }))?
//!     .get("/users/:id", handler_fn(|req: server::HttpRequest| async move {
//!         let id = req.param("id").unwrap_or_default().to_string();
//!         server::text(StatusCode::OK, id)
//!     }))?
//!     .build();
//! ```

use std::convert::Infallible;
use std::future::Future;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use tower::service_fn;
use tower::util::BoxCloneSyncService;

use crate::chain::Middleware;
use crate::{ContentType, Params, PathTemplate, Result, StatusCode};

pub mod middleware;
mod mux;
mod router;

pub use mux::{Mux, MuxService};
pub use router::{Pattern, Resolution, RouteMatch, Router, Segment};

/// Buffered inbound request.
pub type HttpRequest = http::Request<Bytes>;

/// Buffered outbound response.
pub type HttpResponse = http::Response<Bytes>;

/// Terminal handler of a route.
pub type Handler = BoxCloneSyncService<HttpRequest, HttpResponse, Infallible>;

/// Middleware over a handler chain.
pub type HandlerMiddleware = Middleware<HttpRequest, HttpResponse, Infallible>;

/// Turn an async function into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(HttpRequest) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    BoxCloneSyncService::new(service_fn(move |request| {
        let response = f(request);
        async move { Ok::<_, Infallible>(response.await) }
    }))
}

/// Empty response with `status`.
#[must_use]
pub fn status(status: StatusCode) -> HttpResponse {
    let mut response = HttpResponse::new(Bytes::new());
    *response.status_mut() = status;
    response
}

/// `text/plain` response.
#[must_use]
pub fn text(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    with_content_type(status, body.into(), ContentType::PlainText)
}

/// `application/json` response.
///
/// # Errors
///
/// Returns a serialization error if `value` cannot be encoded.
pub fn json<T: serde::Serialize>(status: StatusCode, value: &T) -> Result<HttpResponse> {
    Ok(with_content_type(status, crate::to_json(value)?, ContentType::Json))
}

fn with_content_type(status: StatusCode, body: Bytes, content_type: ContentType) -> HttpResponse {
    let mut response = HttpResponse::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
    response
}

/// Route data the mux attaches to a request.
pub trait RequestExt {
    /// Value bound to the route parameter `name`.
    fn param(&self, name: &str) -> Option<&str>;

    /// Every bound parameter, if the request was routed.
    fn params(&self) -> Option<&Params>;

    /// Pattern of the matched route.
    fn route_pattern(&self) -> Option<&PathTemplate>;
}

impl<B> RequestExt for http::Request<B> {
    fn param(&self, name: &str) -> Option<&str> {
        self.params().and_then(|params| params.get(name))
    }

    fn params(&self) -> Option<&Params> {
        self.extensions().get::<Params>()
    }

    fn route_pattern(&self) -> Option<&PathTemplate> {
        self.extensions().get::<PathTemplate>()
    }
}
