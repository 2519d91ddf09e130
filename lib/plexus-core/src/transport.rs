//! Terminal transport capability.
//!
//! A [`Transport`] performs one network round trip: it takes a fully built
//! [`Request`] and returns the response head with a still-streaming [`Body`].
//! It sits at the very end of a session's middleware chain. Any async
//! closure with the right signature is a transport, which keeps test doubles
//! one line long.
//!
//! # Example
//!
//! ```
//! use plexus_core::{Body, Request, Response, Transport};
//!
//! let echo = |request: Request| async move {
//!     let body = request.body().cloned().unwrap_or_default();
//!     Ok::<_, plexus_core::Error>(Response::with_status(200, Body::full(body)))
//! };
//!
//! fn assert_transport(_: &impl Transport) {}
//! assert_transport(&echo);
//! ```

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::{Body, Request, Response, Result};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The innermost capability of a client chain.
///
/// Implementations must tolerate concurrent calls through `&self`; any
/// connection pool they own synchronizes itself.
pub trait Transport: Send + Sync + 'static {
    /// Send the request and return the response with an unread body.
    ///
    /// # Errors
    ///
    /// Returns a network-kind error ([`crate::ErrorKind::Network`]) when the
    /// round trip fails. A non-2xx status is not an error.
    fn round_trip(&self, request: Request<Bytes>) -> BoxFuture<'static, Result<Response<Body>>>;
}

impl<F, Fut> Transport for F
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>>> + Send + 'static,
{
    fn round_trip(&self, request: Request<Bytes>) -> BoxFuture<'static, Result<Response<Body>>> {
        Box::pin(self(request))
    }
}
