//! Per-invocation tracing middleware.
//!
//! Every time a call passes through [`Trace`], one [`TraceRecord`] is produced
//! and handed to the configured sink. Placed inside a retry middleware it
//! sees every attempt; placed outside it sees the call once.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use tower::{Layer, Service};

use crate::{Error, Method, Request, Response, Result};

/// Callback receiving each finished record.
pub type TraceSink = Arc<dyn Fn(&TraceRecord) + Send + Sync>;

/// Outcome of one traced invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceOutcome {
    /// The inner chain produced a response with this status.
    Status(u16),
    /// The inner chain failed.
    Error(String),
}

/// One traced invocation of the inner chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    /// Sequence number of this invocation for the layer, starting at 1.
    pub sequence: u64,
    /// Request method.
    pub method: Method,
    /// Request URL.
    pub url: String,
    /// When the invocation started.
    pub started_at: SystemTime,
    /// How long the inner chain took.
    pub elapsed: Duration,
    /// What the inner chain returned.
    pub outcome: TraceOutcome,
}

/// Layer producing a [`TraceRecord`] per invocation.
#[derive(Clone)]
pub struct TraceLayer {
    sink: TraceSink,
    counter: Arc<AtomicU64>,
}

impl fmt::Debug for TraceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceLayer")
            .field("invocations", &self.counter.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TraceLayer {
    /// Records go to `sink`.
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(&TraceRecord) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
            counter: Arc::default(),
        }
    }

    /// Records are emitted as `tracing` events only.
    #[must_use]
    pub fn events() -> Self {
        Self::new(|_| {})
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = Trace<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Trace {
            inner,
            sink: Arc::clone(&self.sink),
            counter: Arc::clone(&self.counter),
        }
    }
}

/// Service that records each invocation.
#[derive(Clone)]
pub struct Trace<S> {
    inner: S,
    sink: TraceSink,
    counter: Arc<AtomicU64>,
}

impl<S: fmt::Debug> fmt::Debug for Trace<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trace").field("inner", &self.inner).finish_non_exhaustive()
    }
}

impl<S> Service<Request<Bytes>> for Trace<S>
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
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let method = request.method();
        let url = request.url().to_string();
        let sink = Arc::clone(&self.sink);

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move {
            let started_at = SystemTime::now();
            let start = Instant::now();
            let result = inner.call(request).await;

            let outcome = match &result {
                Ok(response) => TraceOutcome::Status(response.status()),
                Err(err) => TraceOutcome::Error(err.to_string()),
            };
            let record = TraceRecord {
                sequence,
                method,
                url,
                started_at,
                elapsed: start.elapsed(),
                outcome,
            };
            tracing::debug!(
                sequence,
                method = %record.method,
                url = %record.url,
                outcome = ?record.outcome,
                elapsed_ms = u64::try_from(record.elapsed.as_millis()).unwrap_or(u64::MAX),
                "traced invocation"
            );
            sink(&record);

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tower::ServiceExt;
    use tower::service_fn;

    use super::*;

    #[tokio::test]
    async fn records_each_invocation() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&records);
        let layer = TraceLayer::new(move |record: &TraceRecord| {
            sink.lock().expect("records").push(record.clone());
        });

        let service = layer.layer(service_fn(|request: Request<Bytes>| async move {
            if request.url().path() == "/fail" {
                Err(Error::connection("refused"))
            } else {
                Ok(Response::with_status(201, Bytes::new()))
            }
        }));

        let ok = url::Url::parse("http://localhost/ok").expect("url");
        let fail = url::Url::parse("http://localhost/fail").expect("url");
        service
            .clone()
            .oneshot(Request::builder(Method::Post, ok).build())
            .await
            .expect("created");
        service
            .oneshot(Request::builder(Method::Get, fail).build())
            .await
            .expect_err("refused");

        let records = records.lock().expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 1);
        assert_eq!(records[0].method, Method::Post);
        assert_eq!(records[0].outcome, TraceOutcome::Status(201));
        assert_eq!(records[1].sequence, 2);
        assert!(matches!(&records[1].outcome, TraceOutcome::Error(msg) if msg.contains("refused")));
    }
}
