//! Error types for plexus.
//!
//! Every failure is an [`Error`]; [`Error::kind`] groups the variants into the
//! categories callers branch on ([`ErrorKind`]). Router outcomes such as
//! "not found" are not errors and never appear here.

use derive_more::{Display, Error, From};

use crate::Method;

// ============================================================================
// Error Kind
// ============================================================================

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    /// A malformed option or route, detected before any I/O.
    #[display("configuration")]
    Configuration,
    /// Two routes that the router cannot tell apart.
    #[display("route ambiguity")]
    RouteAmbiguity,
    /// Connection, TLS, timeout or cancellation failure from the transport.
    #[display("network")]
    Network,
    /// Body buffering or structured decoding failure.
    #[display("decode")]
    Decode,
    /// A status code turned into an error by an opt-in middleware.
    #[display("status")]
    Status,
    /// A panic caught by a recovery middleware.
    #[display("fatal")]
    Fatal,
}

// ============================================================================
// Error Type
// ============================================================================

/// Main error type for plexus operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Invalid option or session configuration.
    #[display("invalid configuration: {_0}")]
    #[from(skip)]
    Configuration(#[error(not(source))] String),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// Invalid route pattern.
    #[display("invalid route: {_0}")]
    #[from(skip)]
    InvalidRoute(#[error(not(source))] String),

    /// A route with the same shape is already registered for this method.
    #[display("route conflict: {method} {pattern} collides with {existing}")]
    #[from(skip)]
    RouteConflict {
        /// HTTP method of the rejected route.
        method: Method,
        /// Pattern being registered.
        #[error(not(source))]
        pattern: String,
        /// Pattern already registered.
        existing: String,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Request timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// The call was cancelled through its cancel signal.
    #[display("request canceled")]
    #[from(skip)]
    Canceled,

    /// Reading the response body failed mid-stream.
    #[display("body decode error: {_0}")]
    #[from(skip)]
    Decode(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// Query string serialization error.
    #[display("query serialization error: {_0}")]
    #[from]
    QuerySerialization(serde_html_form::ser::Error),

    /// HTTP-level errors (status >= 400), only raised by `raise_for_status`.
    #[display("HTTP error {status}: {message}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<bytes::Bytes>,
    },

    /// A panic raised inside the chain and caught by a recovery middleware.
    #[display("panic in middleware chain: {_0}")]
    #[from(skip)]
    Panic(#[error(not(source))] String),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an invalid route error.
    #[must_use]
    pub fn invalid_route(message: impl Into<String>) -> Self {
        Self::InvalidRoute(message.into())
    }

    /// Create an HTTP error from status code and message.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// Create an HTTP error with body.
    #[must_use]
    pub fn http_with_body(status: u16, message: impl Into<String>, body: bytes::Bytes) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: Some(body),
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a body decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_)
            | Self::InvalidUrl(_)
            | Self::InvalidRoute(_)
            | Self::JsonSerialization(_)
            | Self::QuerySerialization(_) => ErrorKind::Configuration,
            Self::RouteConflict { .. } => ErrorKind::RouteAmbiguity,
            Self::Connection(_) | Self::Tls(_) | Self::Timeout | Self::Canceled => {
                ErrorKind::Network
            }
            Self::Decode(_) | Self::JsonDeserialization { .. } => ErrorKind::Decode,
            Self::Http { .. } => ErrorKind::Status,
            Self::Panic(_) => ErrorKind::Fatal,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if the call was cancelled.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` for any transport-level failure.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network)
    }

    /// Returns `true` for errors detected while validating configuration.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration)
    }

    /// Returns the HTTP status code if this is an HTTP error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the response body if this is an HTTP error with a body.
    #[must_use]
    pub fn body(&self) -> Option<&bytes::Bytes> {
        match self {
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        insta::assert_snapshot!(Error::http(404, "Not Found"), @"HTTP error 404: Not Found");
        insta::assert_snapshot!(Error::Timeout, @"request timeout");
        insta::assert_snapshot!(
            Error::configuration("unsupported proxy scheme `socks5`"),
            @"invalid configuration: unsupported proxy scheme `socks5`"
        );
        insta::assert_snapshot!(
            Error::RouteConflict {
                method: Method::Get,
                pattern: "/users/{name}".to_string(),
                existing: "/users/:id".to_string(),
            },
            @"route conflict: GET /users/{name} collides with /users/:id"
        );
    }

    #[test]
    fn error_kinds() {
        assert_eq!(Error::configuration("x").kind(), ErrorKind::Configuration);
        assert_eq!(Error::invalid_route("x").kind(), ErrorKind::Configuration);
        assert_eq!(Error::connection("refused").kind(), ErrorKind::Network);
        assert_eq!(Error::tls("bad cert").kind(), ErrorKind::Network);
        assert_eq!(Error::Timeout.kind(), ErrorKind::Network);
        assert_eq!(Error::Canceled.kind(), ErrorKind::Network);
        assert_eq!(Error::decode("eof").kind(), ErrorKind::Decode);
        assert_eq!(Error::http(500, "boom").kind(), ErrorKind::Status);
        assert_eq!(Error::Panic("oops".into()).kind(), ErrorKind::Fatal);
    }

    #[test]
    fn error_predicates() {
        assert!(Error::Timeout.is_timeout());
        assert!(Error::Timeout.is_network());
        assert!(Error::Canceled.is_canceled());
        assert!(Error::connection("failed").is_connection());
        assert!(!Error::decode("eof").is_network());
        assert!(Error::configuration("bad").is_configuration());
    }

    #[test]
    fn error_status_and_body() {
        let err = Error::http(404, "Not Found");
        assert_eq!(err.status(), Some(404));
        assert!(err.body().is_none());

        let body = bytes::Bytes::from(r#"{"error": "not found"}"#);
        let err = Error::http_with_body(404, "Not Found", body.clone());
        assert_eq!(err.body(), Some(&body));

        assert_eq!(Error::Timeout.status(), None);
    }
}
