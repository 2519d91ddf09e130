//! HTTP response handling.
//!
//! [`Response`] provides access to status, headers, and body with JSON/text deserialization.
//! A response produced by a session also carries the [`Timing`] of the round trip,
//! a [`RequestSnapshot`] of what was sent, and any error raised while the body
//! was being buffered.
//!
//! # Example
//!
//! ```ignore
//! let user: User = response.json()?;
//! let again: User = response.json()?; // the body is buffered, read it as often as needed
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::HeaderMap;

use crate::RequestSnapshot;

/// Wall-clock statistics of one transport round trip.
///
/// Captured around the terminal transport call and the body drain only, so
/// middleware overhead is not included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// When the request was handed to the transport.
    pub started_at: SystemTime,
    /// When the body was fully buffered.
    pub finished_at: SystemTime,
    /// Monotonic duration of the round trip.
    pub elapsed: Duration,
}

/// HTTP response with status, headers, and body.
#[derive(Debug, Clone)]
pub struct Response<B = Bytes> {
    status: u16,
    headers: HeaderMap,
    body: B,
    timing: Option<Timing>,
    request: Option<Arc<RequestSnapshot>>,
    body_error: Option<Arc<crate::Error>>,
}

impl<B> Response<B> {
    /// Creates a new response.
    #[must_use]
    pub fn new(status: u16, headers: HeaderMap, body: B) -> Self {
        Self {
            status,
            headers,
            body,
            timing: None,
            request: None,
            body_error: None,
        }
    }

    /// Shorthand for a response without headers.
    #[must_use]
    pub fn with_status(status: u16, body: B) -> Self {
        Self::new(status, HeaderMap::new(), body)
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to headers.
    #[must_use]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Single header value by name, if it is valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &B {
        &self.body
    }

    /// Consume into body.
    #[must_use]
    pub fn into_body(self) -> B {
        self.body
    }

    /// Round-trip statistics, when the response came through a session.
    #[must_use]
    pub const fn timing(&self) -> Option<&Timing> {
        self.timing.as_ref()
    }

    /// Round-trip duration, zero when unknown.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.timing.map_or(Duration::ZERO, |t| t.elapsed)
    }

    /// The request that produced this response, as the transport saw it.
    #[must_use]
    pub fn request(&self) -> Option<&RequestSnapshot> {
        self.request.as_deref()
    }

    /// Error raised while buffering the body; the body then holds the bytes
    /// received before the failure.
    #[must_use]
    pub fn body_error(&self) -> Option<&crate::Error> {
        self.body_error.as_deref()
    }

    /// Attach round-trip statistics.
    #[must_use]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Attach the originating request snapshot.
    #[must_use]
    pub fn with_request(mut self, request: RequestSnapshot) -> Self {
        self.request = Some(Arc::new(request));
        self
    }

    /// Attach a body buffering error.
    #[must_use]
    pub fn with_body_error(mut self, error: crate::Error) -> Self {
        self.body_error = Some(Arc::new(error));
        self
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status is 3xx.
    #[must_use]
    pub const fn is_redirection(&self) -> bool {
        self.status >= 300 && self.status < 400
    }

    /// Status is 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// Status is 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }

    /// Detach the body, leaving a body-less head that keeps every other field.
    #[must_use]
    pub fn split_body(self) -> (Response<()>, B) {
        let Self {
            status,
            headers,
            body,
            timing,
            request,
            body_error,
        } = self;
        let head = Response {
            status,
            headers,
            body: (),
            timing,
            request,
            body_error,
        };
        (head, body)
    }

    /// Transform the body with a function, keeping everything else.
    pub fn map_body<F, B2>(self, f: F) -> Response<B2>
    where
        F: FnOnce(B) -> B2,
    {
        Response {
            status: self.status,
            headers: self.headers,
            body: f(self.body),
            timing: self.timing,
            request: self.request,
            body_error: self.body_error,
        }
    }
}

impl Response<Bytes> {
    /// Buffered body bytes; cheap to clone and readable any number of times.
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Deserialize the response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the body buffering error if one was recorded, otherwise a
    /// path-aware deserialization error.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        if let Some(err) = &self.body_error {
            return Err(crate::Error::decode(err.to_string()));
        }
        crate::from_json(&self.body)
    }

    /// Get the response body as text.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the body is not valid UTF-8.
    pub fn text(&self) -> crate::Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| crate::Error::decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;
    use crate::{Method, Request};

    #[test]
    fn response_basic() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let response = Response::new(200, headers, Bytes::from(r#"{"id":1}"#));

        assert_eq!(response.status(), 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert!(response.is_success());
        assert!(response.timing().is_none());
        assert_eq!(response.elapsed(), Duration::ZERO);
    }

    #[test]
    fn response_status_checks() {
        assert!(Response::with_status(301, ()).is_redirection());
        assert!(Response::with_status(404, ()).is_client_error());
        assert!(Response::with_status(500, ()).is_server_error());
        assert!(!Response::with_status(500, ()).is_success());
    }

    #[test]
    fn body_is_replayable() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct User {
            id: u64,
        }

        let response = Response::with_status(200, Bytes::from(r#"{"id":7}"#));

        let first: User = response.json().expect("first read");
        let second: User = response.json().expect("second read");
        assert_eq!(first, second);
        assert_eq!(response.text().expect("text"), r#"{"id":7}"#);
        assert_eq!(response.bytes(), response.bytes());
    }

    #[test]
    fn body_error_blocks_json_decode() {
        let response = Response::with_status(200, Bytes::from_static(br#"{"id":"#))
            .with_body_error(crate::Error::decode("connection reset"));

        assert!(response.body_error().is_some());
        let err = response.json::<serde_json::Value>().expect_err("truncated");
        assert_eq!(err.kind(), crate::ErrorKind::Decode);
        assert_eq!(response.text().expect("partial text"), r#"{"id":"#);
    }

    #[test]
    fn map_body_keeps_diagnostics() {
        let url = url::Url::parse("https://api.example.com/ping").expect("url");
        let snapshot = Request::<Bytes>::builder(Method::Head, url).build().snapshot();
        let timing = Timing {
            started_at: SystemTime::UNIX_EPOCH,
            finished_at: SystemTime::UNIX_EPOCH + Duration::from_millis(12),
            elapsed: Duration::from_millis(12),
        };

        let response = Response::with_status(204, Bytes::from("test"))
            .with_timing(timing)
            .with_request(snapshot);
        let mapped = response.map_body(|b| b.len());

        assert_eq!(*mapped.body(), 4);
        assert_eq!(mapped.elapsed(), Duration::from_millis(12));
        assert_eq!(mapped.request().map(|r| r.method), Some(Method::Head));
    }
}
