//! Middleware composition shared by the client and server pipelines.
//!
//! A [`Middleware`] turns the "next" service into a wrapped service with the
//! same request, response and error types. [`compose`] folds an ordered list
//! around a terminal service so that the first-declared middleware is the
//! outermost one: it sees the request first and the result last.
//!
//! ```text
//! compose(T, [m1, m2, m3]) == m1(m2(m3(T)))
//!
//! request  → m1 → m2 → m3 → T
//! response ← m1 ← m2 ← m3 ← T
//! ```

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};

/// Type-erased service every middleware wraps and returns.
pub type BoxedService<Req, Res, E> = BoxCloneSyncService<Req, Res, E>;

type Wrap<Req, Res, E> =
    Arc<dyn Fn(BoxedService<Req, Res, E>) -> BoxedService<Req, Res, E> + Send + Sync>;

/// A named wrapper around a "next" service.
pub struct Middleware<Req, Res, E> {
    name: Cow<'static, str>,
    wrap: Wrap<Req, Res, E>,
}

impl<Req, Res, E> Clone for Middleware<Req, Res, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            wrap: Arc::clone(&self.wrap),
        }
    }
}

impl<Req, Res, E> fmt::Debug for Middleware<Req, Res, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.name).finish()
    }
}

impl<Req, Res, E> Middleware<Req, Res, E>
where
    Req: Send + 'static,
    Res: Send + 'static,
    E: Send + 'static,
{
    /// Wrap any Tower layer.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use plexus::chain::Middleware;
    /// use tower::limit::ConcurrencyLimitLayer;
    ///
    /// let limit = Middleware::layer("concurrency", ConcurrencyLimitLayer::new(8));
    /// ```
    pub fn layer<L>(name: impl Into<Cow<'static, str>>, layer: L) -> Self
    where
        L: Layer<BoxedService<Req, Res, E>> + Send + Sync + 'static,
        L::Service: Service<Req, Response = Res, Error = E> + Clone + Send + Sync + 'static,
        <L::Service as Service<Req>>::Future: Send + 'static,
    {
        Self {
            name: name.into(),
            wrap: Arc::new(move |inner| BoxCloneSyncService::new(layer.layer(inner))),
        }
    }

    /// Build a middleware from an async closure receiving the request and [`Next`].
    ///
    /// The closure may change the request before calling `next.run`, change
    /// the result afterwards, or return without calling `next` at all.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let stamp = Middleware::from_fn("stamp", |mut request: Request, next| async move {
    ///     request.headers_mut().insert("x-stamp", HeaderValue::from_static("1"));
    ///     next.run(request).await
    /// });
    /// ```
    pub fn from_fn<F, Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Req, Next<Req, Res, E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, E>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self {
            name: name.into(),
            wrap: Arc::new(move |inner| {
                BoxCloneSyncService::new(FromFn {
                    f: Arc::clone(&f),
                    inner,
                })
            }),
        }
    }

    /// Name used in logs and `Debug` output.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrap `next` with this middleware.
    #[must_use]
    pub fn apply(&self, next: BoxedService<Req, Res, E>) -> BoxedService<Req, Res, E> {
        (self.wrap)(next)
    }
}

/// Compose `middlewares` around `terminal`, first-declared outermost.
#[must_use]
pub fn compose<Req, Res, E>(
    terminal: BoxedService<Req, Res, E>,
    middlewares: &[Middleware<Req, Res, E>],
) -> BoxedService<Req, Res, E>
where
    Req: Send + 'static,
    Res: Send + 'static,
    E: Send + 'static,
{
    middlewares
        .iter()
        .rev()
        .fold(terminal, |next, middleware| middleware.apply(next))
}

/// The rest of the chain, handed to [`Middleware::from_fn`] closures.
pub struct Next<Req, Res, E> {
    inner: BoxedService<Req, Res, E>,
}

impl<Req, Res, E> fmt::Debug for Next<Req, Res, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

impl<Req, Res, E> Next<Req, Res, E>
where
    Req: Send + 'static,
    Res: Send + 'static,
    E: Send + 'static,
{
    /// Invoke the remaining chain.
    pub async fn run(self, request: Req) -> Result<Res, E> {
        self.inner.oneshot(request).await
    }
}

struct FromFn<F, Req, Res, E> {
    f: Arc<F>,
    inner: BoxedService<Req, Res, E>,
}

impl<F, Req, Res, E> Clone for FromFn<F, Req, Res, E> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
            inner: self.inner.clone(),
        }
    }
}

impl<F, Fut, Req, Res, E> Service<Req> for FromFn<F, Req, Res, E>
where
    F: Fn(Req, Next<Req, Res, E>) -> Fut,
    Fut: Future<Output = Result<Res, E>>,
{
    type Response = Res;
    type Error = E;
    type Future = Fut;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), E>> {
        // the inner chain is driven to readiness by `Next::run`
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Req) -> Self::Future {
        let next = Next {
            inner: self.inner.clone(),
        };
        (self.f)(request, next)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Mutex;

    use tower::service_fn;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(name: &'static str, log: &Log) -> Middleware<u32, u32, Infallible> {
        let log = Arc::clone(log);
        Middleware::from_fn(name, move |request: u32, next: Next<u32, u32, Infallible>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().expect("log").push(format!("{name} in"));
                let response = next.run(request + 1).await;
                log.lock().expect("log").push(format!("{name} out"));
                response
            }
        })
    }

    fn terminal(log: &Log) -> BoxedService<u32, u32, Infallible> {
        let log = Arc::clone(log);
        BoxCloneSyncService::new(service_fn(move |request: u32| {
            log.lock().expect("log").push("terminal".to_string());
            async move { Ok(request * 10) }
        }))
    }

    #[tokio::test]
    async fn first_declared_is_outermost() {
        let log = Log::default();
        let chain = compose(
            terminal(&log),
            &[
                recording("m1", &log),
                recording("m2", &log),
                recording("m3", &log),
            ],
        );

        let response = chain.oneshot(0).await.expect("infallible");

        assert_eq!(response, 30);
        assert_eq!(
            *log.lock().expect("log"),
            ["m1 in", "m2 in", "m3 in", "terminal", "m3 out", "m2 out", "m1 out"]
        );
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let log = Log::default();
        let gate = Middleware::from_fn("gate", |request: u32, next: Next<u32, u32, Infallible>| async move {
            if request == 0 {
                return Ok(404);
            }
            next.run(request).await
        });

        let chain = compose(terminal(&log), &[gate]);

        assert_eq!(chain.clone().oneshot(0).await.expect("infallible"), 404);
        assert!(log.lock().expect("log").is_empty());
        assert_eq!(chain.oneshot(2).await.expect("infallible"), 20);
    }

    #[tokio::test]
    async fn empty_chain_is_terminal() {
        let log = Log::default();
        let chain = compose(terminal(&log), &[]);
        assert_eq!(chain.oneshot(4).await.expect("infallible"), 40);
    }

    #[test]
    fn debug_shows_name() {
        let log = Log::default();
        let middleware = recording("audit", &log);
        assert_eq!(middleware.name(), "audit");
        assert_eq!(format!("{middleware:?}"), r#"Middleware("audit")"#);
    }
}
