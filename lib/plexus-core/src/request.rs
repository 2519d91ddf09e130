//! HTTP request building.
//!
//! Use [`Request::builder`] to construct requests with headers and a body.
//!
//! # Example
//!
//! ```
//! use plexus_core::{Request, Method};
//! use bytes::Bytes;
//!
//! let request = Request::<Bytes>::builder(Method::Get, "https://api.example.com".parse().unwrap())
//!     .header(http::header::ACCEPT, http::HeaderValue::from_static("application/json"))
//!     .build();
//! ```

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::Method;

/// An HTTP request with method, URL, headers, and optional body.
#[derive(Debug, Clone)]
pub struct Request<B = Bytes> {
    method: Method,
    url: url::Url,
    headers: HeaderMap,
    body: Option<B>,
}

impl<B> Request<B> {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: url::Url) -> RequestBuilder<B> {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Request headers.
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

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }

    /// Consume into (method, url, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (Method, url::Url, HeaderMap, Option<B>) {
        (self.method, self.url, self.headers, self.body)
    }

    /// Rebuild a request from its parts.
    #[must_use]
    pub fn from_parts(method: Method, url: url::Url, headers: HeaderMap, body: Option<B>) -> Self {
        Self {
            method,
            url,
            headers,
            body,
        }
    }
}

impl Request<Bytes> {
    /// Capture the method, URL and headers of this request for diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body_len: self.body.as_ref().map_or(0, Bytes::len),
        }
    }
}

/// The request as it was handed to the transport, kept on the response.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSnapshot {
    /// HTTP method.
    pub method: Method,
    /// Final URL, including query.
    pub url: url::Url,
    /// Headers after every middleware ran.
    pub headers: HeaderMap,
    /// Body size in bytes.
    pub body_len: usize,
}

/// Builder for constructing [`Request`] instances.
#[derive(Debug, Clone)]
pub struct RequestBuilder<B = Bytes> {
    method: Method,
    url: url::Url,
    headers: HeaderMap,
    body: Option<B>,
}

impl<B> RequestBuilder<B> {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Sets a header, replacing any previous value for that name.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: B) -> Self {
        self.body = Some(body);
        self
    }

    /// Builds the [`Request`].
    #[must_use]
    pub fn build(self) -> Request<B> {
        Request {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use http::header::ACCEPT;

    use super::*;

    fn url(s: &str) -> url::Url {
        url::Url::parse(s).expect("valid URL")
    }

    #[test]
    fn request_builder_basic() {
        let request = Request::<Bytes>::builder(Method::Get, url("https://api.example.com/users"))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .build();

        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.url().as_str(), "https://api.example.com/users");
        assert_eq!(request.header("accept"), Some("application/json"));
        assert!(request.body().is_none());
    }

    #[test]
    fn snapshot_captures_effective_request() {
        let request = Request::builder(Method::Post, url("https://api.example.com/users"))
            .header(ACCEPT, HeaderValue::from_static("text/plain"))
            .body(Bytes::from_static(b"hello"))
            .build();

        let snapshot = request.snapshot();
        assert_eq!(snapshot.method, Method::Post);
        assert_eq!(snapshot.url.path(), "/users");
        assert_eq!(snapshot.body_len, 5);
        assert_eq!(snapshot.headers.get(ACCEPT), Some(&HeaderValue::from_static("text/plain")));
    }
}
