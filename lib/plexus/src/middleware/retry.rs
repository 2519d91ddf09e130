//! Retry middleware for HTTP requests.
//!
//! [`RetryPolicy`] plugs into Tower's [`RetryLayer`](tower::retry::RetryLayer).
//! Every attempt re-enters the inner chain with a clone of the original
//! request; the buffered body makes that clone cheap.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tower::retry::Policy;

use crate::{Error, Request, Response};

type RetryPredicate = Arc<dyn Fn(&Result<Response<Bytes>, Error>) -> bool + Send + Sync>;

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,
    /// Wait the same delay before each retry.
    Fixed(Duration),
    /// Double the delay after each retry, starting at `base`, never above `max`.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Upper bound for any single delay.
        max: Duration,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Retry policy for HTTP requests.
///
/// By default, retries:
/// - network errors (connection, TLS, timeout)
/// - 5xx server errors
/// - 429 Too Many Requests
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use plexus::middleware::{Backoff, RetryPolicy};
///
/// let policy = RetryPolicy::new(3).with_backoff(Backoff::Fixed(Duration::from_millis(100)));
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    attempt: u32,
    backoff: Backoff,
    predicate: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("attempt", &self.attempt)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// A policy allowing at most `max_attempts` invocations of the inner chain,
    /// the first one included.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempt: 1,
            backoff: Backoff::None,
            predicate: Arc::new(Self::default_predicate),
        }
    }

    /// Set the delay between attempts.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the decision of which outcomes are retried.
    #[must_use]
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Result<Response<Bytes>, Error>) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Maximum number of invocations, the first one included.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Configured backoff.
    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }

    fn default_predicate(result: &Result<Response<Bytes>, Error>) -> bool {
        match result {
            Ok(response) => response.is_server_error() || response.status() == 429,
            Err(error) => error.is_connection() || error.is_timeout() || matches!(error, Error::Tls(_)),
        }
    }
}

impl Policy<Request<Bytes>, Response<Bytes>, Error> for RetryPolicy {
    type Future = tokio::time::Sleep;

    fn retry(
        &mut self,
        request: &mut Request<Bytes>,
        result: &mut Result<Response<Bytes>, Error>,
    ) -> Option<Self::Future> {
        if self.attempt >= self.max_attempts || !(self.predicate)(result) {
            return None;
        }

        let delay = self.backoff.delay(self.attempt);
        self.attempt += 1;
        tracing::debug!(
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            url = %request.url(),
            "retrying request"
        );
        Some(tokio::time::sleep(delay))
    }

    fn clone_request(&mut self, request: &Request<Bytes>) -> Option<Request<Bytes>> {
        Some(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderMap;

    use super::*;

    fn status(code: u16) -> Result<Response<Bytes>, Error> {
        Ok(Response::new(code, HeaderMap::new(), Bytes::new()))
    }

    #[test]
    fn default_predicate_retries_transient_failures() {
        assert!(RetryPolicy::default_predicate(&status(500)));
        assert!(RetryPolicy::default_predicate(&status(503)));
        assert!(RetryPolicy::default_predicate(&status(429)));
        assert!(RetryPolicy::default_predicate(&Err(Error::connection("refused"))));
        assert!(RetryPolicy::default_predicate(&Err(Error::Timeout)));
    }

    #[test]
    fn default_predicate_keeps_final_outcomes() {
        assert!(!RetryPolicy::default_predicate(&status(200)));
        assert!(!RetryPolicy::default_predicate(&status(404)));
        assert!(!RetryPolicy::default_predicate(&Err(Error::Canceled)));
        assert!(!RetryPolicy::default_predicate(&Err(Error::decode("eof"))));
    }

    #[tokio::test]
    async fn policy_stops_after_max_attempts() {
        let url = url::Url::parse("http://localhost/").expect("url");
        let mut request = Request::builder(crate::Method::Get, url).build();
        let mut policy = RetryPolicy::new(3);

        let mut retries = 0;
        while policy.retry(&mut request, &mut status(500)).is_some() {
            retries += 1;
        }

        assert_eq!(retries, 2);
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(350),
        };

        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(350));
        assert_eq!(backoff.delay(30), Duration::from_millis(350));
        assert_eq!(Backoff::Fixed(Duration::from_secs(1)).delay(5), Duration::from_secs(1));
    }

    #[test]
    fn custom_predicate() {
        let policy = RetryPolicy::new(2).retry_if(|result| matches!(result, Ok(r) if r.status() == 404));
        assert!((policy.predicate)(&status(404)));
        assert!(!(policy.predicate)(&status(500)));
    }
}
