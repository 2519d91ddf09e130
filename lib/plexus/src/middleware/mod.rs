//! Client middleware.
//!
//! A [`ClientMiddleware`] wraps the rest of a session's chain. Middleware
//! declared on the session runs outside middleware declared on the call, and
//! within each list the first-declared one is outermost. Every built-in here
//! is a plain Tower layer, so [`Middleware::layer`](crate::chain::Middleware::layer)
//! accepts any third-party layer just as well.
//!
//! # Available middleware
//!
//! - [`logging`] / [`debug_logging`] - `tracing` events per call ([`LoggingLayer`])
//! - [`trace`] - one [`TraceRecord`] per invocation of the inner chain ([`TraceLayer`])
//! - [`retry`] - re-invoke the inner chain per a [`RetryPolicy`]
//! - [`raise_for_status`] - turn 4xx/5xx into [`Error::Http`](crate::Error::Http)
//! - [`recover`] - turn panics into [`Error::Panic`](crate::Error::Panic)
//! - [`bearer_auth`] / [`basic_auth`] - set the `Authorization` header
//!
//! # Example
//!
//! ```ignore
//! use plexus::{middleware, opt};
//!
//! let response = session
//!     .get("/flaky", [
//!         opt::middleware(middleware::logging()),
//!         opt::middleware(middleware::retry(RetryPolicy::new(3))),
//!     ])
//!     .await?;
//! ```

use bytes::Bytes;

use crate::chain::Middleware;
use crate::{Error, Request, Response, Result};

mod basic_auth;
mod bearer_auth;
mod logging;
mod recover;
mod retry;
mod status;
mod trace;

pub use basic_auth::{BasicAuth, BasicAuthLayer};
pub(crate) use basic_auth::basic_credentials;
pub use bearer_auth::{BearerAuth, BearerAuthLayer};
pub use logging::{LogLevel, Logging, LoggingLayer};
pub(crate) use recover::panic_message;
pub use recover::{Recover, RecoverLayer};
pub use retry::{Backoff, RetryPolicy};
pub use status::{RaiseForStatus, RaiseForStatusLayer};
pub use trace::{Trace, TraceLayer, TraceOutcome, TraceRecord, TraceSink};

// Re-export tower types for custom middleware
pub use tower::Layer;
pub use tower::retry::RetryLayer;

/// Middleware over the client chain.
pub type ClientMiddleware = Middleware<Request<Bytes>, Response<Bytes>, Error>;

/// Info-level request/response logging.
#[must_use]
pub fn logging() -> ClientMiddleware {
    Middleware::layer("logging", LoggingLayer::new())
}

/// Debug-level logging including (redacted) headers.
#[must_use]
pub fn debug_logging() -> ClientMiddleware {
    Middleware::layer("debug-logging", LoggingLayer::debug())
}

/// Hand a [`TraceRecord`] to `sink` for every invocation of the inner chain.
pub fn trace<F>(sink: F) -> ClientMiddleware
where
    F: Fn(&TraceRecord) + Send + Sync + 'static,
{
    Middleware::layer("trace", TraceLayer::new(sink))
}

/// Re-invoke the inner chain according to `policy`.
#[must_use]
pub fn retry(policy: RetryPolicy) -> ClientMiddleware {
    Middleware::layer("retry", RetryLayer::new(policy))
}

/// Turn 4xx and 5xx responses into [`Error::Http`].
#[must_use]
pub fn raise_for_status() -> ClientMiddleware {
    Middleware::layer("raise-for-status", RaiseForStatusLayer)
}

/// Catch panics from the inner chain as [`Error::Panic`].
#[must_use]
pub fn recover() -> ClientMiddleware {
    Middleware::layer("recover", RecoverLayer)
}

/// Set `Authorization: Bearer <token>`.
///
/// # Errors
///
/// Returns a configuration error if the token is not a valid header value.
pub fn bearer_auth(token: impl AsRef<str>) -> Result<ClientMiddleware> {
    Ok(Middleware::layer("bearer-auth", BearerAuthLayer::new(token)?))
}

/// Set `Authorization: Basic <base64(user:pass)>`.
#[must_use]
pub fn basic_auth(username: impl AsRef<str>, password: impl AsRef<str>) -> ClientMiddleware {
    Middleware::layer("basic-auth", BasicAuthLayer::new(username, password))
}
