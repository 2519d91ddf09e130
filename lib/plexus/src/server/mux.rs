//! Route registration and dispatch.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::header::{ALLOW, HeaderValue};
use http_body_util::{BodyExt, Full};
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};
use tracing::debug;

use super::router::{Resolution, Router};
use super::{Handler, HandlerMiddleware, HttpRequest, HttpResponse, handler_fn};
use crate::chain::compose;
use crate::{BoxFuture, Method, Result, StatusCode};

struct RouteEntry {
    handler: Handler,
    middleware: Vec<HandlerMiddleware>,
}

/// Builder for a [`MuxService`].
///
/// Registration errors surface immediately from [`route`](Self::route) and
/// the per-method helpers. Middleware added with [`with`](Self::with) wraps
/// every route and the not-found and method-not-allowed handlers, whenever it
/// is added.
pub struct Mux {
    routes: Router<RouteEntry>,
    global: Vec<HandlerMiddleware>,
    not_found: Handler,
    method_not_allowed: Handler,
}

impl fmt::Debug for Mux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mux")
            .field("routes", &self.routes.len())
            .field("global", &self.global)
            .finish_non_exhaustive()
    }
}

impl Default for Mux {
    fn default() -> Self {
        Self {
            routes: Router::new(),
            global: Vec::new(),
            not_found: handler_fn(|_| async { super::status(StatusCode::NOT_FOUND) }),
            method_not_allowed: handler_fn(|_| async {
                super::status(StatusCode::METHOD_NOT_ALLOWED)
            }),
        }
    }
}

macro_rules! method_helpers {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            #[doc = concat!("Register a `", stringify!($method), "` route without route middleware.")]
            ///
            /// # Errors
            ///
            /// Same as [`route`](Self::route).
            pub fn $name<H>(self, pattern: &str, handler: H) -> Result<Self>
            where
                H: Service<HttpRequest, Response = HttpResponse, Error = Infallible>
                    + Clone
                    + Send
                    + Sync
                    + 'static,
                H::Future: Send + 'static,
            {
                self.route(Method::$method, pattern, handler, [])
            }
        )*
    };
}

impl Mux {
    /// An empty mux answering 404 to everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add global middleware, outside every per-route middleware.
    #[must_use]
    pub fn with(mut self, middleware: HandlerMiddleware) -> Self {
        self.global.push(middleware);
        self
    }

    /// Register `handler` for `method` and `pattern`, wrapped by `middleware`
    /// (first-declared outermost).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRoute`](crate::Error::InvalidRoute) for a malformed pattern
    /// - [`Error::RouteConflict`](crate::Error::RouteConflict) if the method
    ///   already has a route of the same shape
    pub fn route<H>(
        mut self,
        method: Method,
        pattern: &str,
        handler: H,
        middleware: impl IntoIterator<Item = HandlerMiddleware>,
    ) -> Result<Self>
    where
        H: Service<HttpRequest, Response = HttpResponse, Error = Infallible>
            + Clone
            + Send
            + Sync
            + 'static,
        H::Future: Send + 'static,
    {
        let entry = RouteEntry {
            handler: BoxCloneSyncService::new(handler),
            middleware: middleware.into_iter().collect(),
        };
        self.routes.insert(method, pattern, entry)?;
        debug!(%method, pattern, "route registered");
        Ok(self)
    }

    method_helpers! {
        get => Get,
        post => Post,
        put => Put,
        delete => Delete,
        patch => Patch,
        head => Head,
        options => Options,
    }

    /// Handler for paths no route matches. Defaults to an empty 404.
    #[must_use]
    pub fn not_found(mut self, handler: Handler) -> Self {
        self.not_found = handler;
        self
    }

    /// Handler for paths only other methods match. Defaults to an empty 405.
    ///
    /// The `Allow` header is added to its response unless it sets one.
    #[must_use]
    pub fn method_not_allowed(mut self, handler: Handler) -> Self {
        self.method_not_allowed = handler;
        self
    }

    /// Compose every chain once and freeze the table.
    #[must_use]
    pub fn build(self) -> MuxService {
        let global = self.global;
        let routes = self.routes.map(|_, _, entry| {
            let chain: Vec<_> = global.iter().chain(&entry.middleware).cloned().collect();
            compose(entry.handler, &chain)
        });

        MuxService {
            inner: Arc::new(MuxInner {
                routes,
                not_found: compose(self.not_found, &global),
                method_not_allowed: compose(self.method_not_allowed, &global),
            }),
        }
    }
}

struct MuxInner {
    routes: Router<Handler>,
    not_found: Handler,
    method_not_allowed: Handler,
}

/// Frozen route table implementing [`tower::Service`].
///
/// Cloning is cheap; clones share the table.
#[derive(Clone)]
pub struct MuxService {
    inner: Arc<MuxInner>,
}

impl fmt::Debug for MuxService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxService")
            .field("routes", &self.inner.routes.len())
            .finish()
    }
}

impl MuxService {
    /// Route a buffered request and run its chain.
    ///
    /// Matched [`Params`](crate::Params) and [`PathTemplate`](crate::PathTemplate)
    /// are inserted into the request extensions before the chain runs.
    pub fn dispatch(&self, mut request: HttpRequest) -> BoxFuture<'static, HttpResponse> {
        let path = request.uri().path().to_string();
        let method = Method::try_from(request.method()).ok();

        let resolution = match method {
            Some(method) => self.inner.routes.resolve(method, &path),
            None => match self.inner.routes.allowed_methods(&path) {
                allowed if allowed.is_empty() => Resolution::NotFound,
                allowed => Resolution::MethodNotAllowed { allowed },
            },
        };

        let (handler, allow) = match resolution {
            Resolution::Matched(found) => {
                request.extensions_mut().insert(found.params);
                request.extensions_mut().insert(found.pattern.clone());
                (found.route.clone(), None)
            }
            Resolution::MethodNotAllowed { allowed } => {
                debug!(method = %request.method(), %path, ?allowed, "method not allowed");
                (self.inner.method_not_allowed.clone(), Some(allow_header(&allowed)))
            }
            Resolution::NotFound => {
                debug!(method = %request.method(), %path, "no route");
                (self.inner.not_found.clone(), None)
            }
        };

        Box::pin(async move {
            let Ok(mut response) = handler.oneshot(request).await;
            if let Some(allow) = allow {
                response.headers_mut().entry(ALLOW).or_insert(allow);
            }
            response
        })
    }
}

fn allow_header(allowed: &[Method]) -> HeaderValue {
    let names: Vec<_> = allowed.iter().map(Method::as_str).collect();
    // method names are ASCII tokens
    HeaderValue::from_str(&names.join(", ")).unwrap_or_else(|_| HeaderValue::from_static(""))
}

impl<B> Service<http::Request<B>> for MuxService
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: fmt::Display + Send,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let mux = self.clone();
        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let response = match body.collect().await {
                Ok(collected) => {
                    mux.dispatch(http::Request::from_parts(parts, collected.to_bytes()))
                        .await
                }
                Err(err) => {
                    debug!(error = %err, "failed to read request body");
                    super::text(StatusCode::BAD_REQUEST, format!("cannot read request body: {err}"))
                }
            };
            Ok(response.map(Full::new))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use assert2::{check, let_assert};

    use super::*;
    use crate::chain::{Middleware, Next};
    use crate::server::{RequestExt, text};

    fn request(method: http::Method, path: &str) -> HttpRequest {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .expect("request")
    }

    fn echo_route() -> Handler {
        handler_fn(|request: HttpRequest| async move {
            let pattern = request.route_pattern().map(ToString::to_string).unwrap_or_default();
            let params = request
                .params()
                .map(|params| {
                    params
                        .iter()
                        .map(|(name, value)| format!("{name}={value}"))
                        .collect::<Vec<_>>()
                        .join("&")
                })
                .unwrap_or_default();
            text(StatusCode::OK, format!("{pattern} {params}"))
        })
    }

    fn tagging(tag: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> HandlerMiddleware {
        let log = Arc::clone(log);
        Middleware::from_fn(tag, move |request: HttpRequest, next: Next<HttpRequest, HttpResponse, Infallible>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().expect("log").push(tag);
                next.run(request).await
            }
        })
    }

    #[tokio::test]
    async fn dispatch_exposes_params_and_pattern() {
        let mux = Mux::new()
            .get("/users/list", echo_route())
            .and_then(|mux| mux.get("/users/:id", echo_route()))
            .and_then(|mux| mux.get("/orgs/{org}/users/{id}", echo_route()))
            .expect("valid routes")
            .build();

        let response = mux.dispatch(request(http::Method::GET, "/users/list")).await;
        check!(response.body().as_ref() == b"/users/list ");

        let response = mux.dispatch(request(http::Method::GET, "/users/7")).await;
        check!(response.body().as_ref() == b"/users/:id id=7");

        let response = mux.dispatch(request(http::Method::GET, "/orgs/acme/users/7")).await;
        check!(response.body().as_ref() == b"/orgs/{org}/users/{id} org=acme&id=7");
    }

    #[tokio::test]
    async fn not_found_and_method_not_allowed() {
        let mux = Mux::new()
            .get("/items/:id", echo_route())
            .and_then(|mux| mux.delete("/items/:id", echo_route()))
            .expect("valid routes")
            .build();

        let response = mux.dispatch(request(http::Method::GET, "/nope")).await;
        check!(response.status() == StatusCode::NOT_FOUND);

        let response = mux.dispatch(request(http::Method::PUT, "/items/1")).await;
        check!(response.status() == StatusCode::METHOD_NOT_ALLOWED);
        check!(response.headers()[ALLOW] == "GET, DELETE");

        let trace = http::Method::from_bytes(b"TRACE").expect("method");
        let response = mux.dispatch(request(trace, "/items/1")).await;
        check!(response.status() == StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn custom_fallbacks_run_through_global_middleware() {
        let log = Arc::default();
        let mux = Mux::new()
            .with(tagging("global", &log))
            .not_found(handler_fn(|_| async { text(StatusCode::NOT_FOUND, "nothing here") }))
            .build();

        let response = mux.dispatch(request(http::Method::GET, "/missing")).await;

        check!(response.status() == StatusCode::NOT_FOUND);
        check!(response.body().as_ref() == b"nothing here");
        check!(*log.lock().expect("log") == ["global"]);
    }

    #[tokio::test]
    async fn global_middleware_wraps_route_middleware() {
        let log = Arc::default();
        let mux = Mux::new()
            .route(
                Method::Get,
                "/",
                echo_route(),
                [tagging("route-1", &log), tagging("route-2", &log)],
            )
            .expect("valid route")
            // added after the route, still outermost
            .with(tagging("global", &log))
            .build();

        let response = mux.dispatch(request(http::Method::GET, "/")).await;

        check!(response.status() == StatusCode::OK);
        check!(*log.lock().expect("log") == ["global", "route-1", "route-2"]);
    }

    #[test]
    fn conflicts_are_reported_at_registration() {
        let result = Mux::new()
            .post("/users/{id}", echo_route())
            .and_then(|mux| mux.post("/users/:user", echo_route()));

        let_assert!(Err(err) = result);
        check!(err.kind() == crate::ErrorKind::RouteAmbiguity);
    }

    #[tokio::test]
    async fn tower_service_collects_the_body() {
        let mut mux = Mux::new()
            .post(
                "/echo",
                handler_fn(|request: HttpRequest| async move {
                    text(StatusCode::OK, request.into_body())
                }),
            )
            .expect("valid route")
            .build();

        let request = http::Request::post("/echo")
            .body(Full::new(Bytes::from_static(b"ping")))
            .expect("request");
        let response = mux.call(request).await.expect("infallible");

        check!(response.status() == StatusCode::OK);
        let body = response.into_body().collect().await.expect("full body").to_bytes();
        check!(body.as_ref() == b"ping");
    }
}
