//! Request options.
//!
//! An [`Opt`] is one named configuration mutation. Options are plain values:
//! a session is built from a list of them, and every call passes another list
//! that is merged over the session's (see [`merge`](crate::merge)).
//!
//! Each constructor states how repeated use behaves:
//!
//! | Option | Behaviour |
//! |--------|-----------|
//! | [`url`], [`path`], [`method`], [`timeout`], [`proxy`], [`retry`], [`insecure_skip_verify`], [`max_connections`], [`cancel`] | replace |
//! | [`body`], [`text`], [`json`], [`form`], [`file`] | replace (one body, last wins) |
//! | [`header`], [`headers`], [`user_agent`] | per-key replace, other keys accumulate |
//! | [`query`], [`queries`] | append |
//! | [`middleware`], [`bearer_auth`], [`basic_auth`] | append |
//!
//! Fallible constructors such as [`json`] never fail on the spot: a rejected
//! option is remembered and reported as a configuration error when the
//! options are merged, before any I/O.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use plexus::opt;
//!
//! let response = session
//!     .post("/users", [
//!         opt::json(&new_user),
//!         opt::header("x-request-id", "42"),
//!         opt::timeout(Duration::from_secs(2)),
//!     ])
//!     .await?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;

use crate::chain::Middleware;
use crate::middleware::{BearerAuthLayer, ClientMiddleware, RetryPolicy};
use crate::{CancelSignal, ContentType, Method};

/// A single configuration mutation.
#[derive(Debug, Clone)]
pub struct Opt(pub(crate) OptKind);

#[derive(Debug, Clone)]
pub(crate) enum OptKind {
    Url(String),
    Path(String),
    Method(Method),
    Header(String, String),
    Query(Vec<(String, String)>),
    Body(BodySource),
    Timeout(Duration),
    Proxy(String),
    Retry(RetryPolicy),
    Middleware(ClientMiddleware),
    InsecureSkipVerify(bool),
    MaxConnections(usize),
    Cancel(CancelSignal),
    Rejected(String),
    Batch(Vec<Opt>),
}

/// Where a request body comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySource {
    /// In-memory bytes with an optional default content type.
    Bytes {
        /// Body content.
        bytes: Bytes,
        /// Content type set unless the caller sets one explicitly.
        content_type: Option<&'static str>,
    },
    /// A file read when the request is built.
    File(PathBuf),
}

/// Target URL. Replaces the session URL.
pub fn url(url: impl Into<String>) -> Opt {
    Opt(OptKind::Url(url.into()))
}

/// Path appended to the URL with exactly one `/` in between. Replaces.
///
/// A `?` in the path starts query pairs that are appended like [`query`].
pub fn path(path: impl Into<String>) -> Opt {
    Opt(OptKind::Path(path.into()))
}

/// HTTP method, `GET` when never set. Replaces.
#[must_use]
pub fn method(method: Method) -> Opt {
    Opt(OptKind::Method(method))
}

/// Set a header. Replaces an earlier value of the same name (case-insensitive).
pub fn header(name: impl Into<String>, value: impl Into<String>) -> Opt {
    Opt(OptKind::Header(name.into(), value.into()))
}

/// Set several headers, each as [`header`].
pub fn headers<I, K, V>(headers: I) -> Opt
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    Opt(OptKind::Batch(
        headers
            .into_iter()
            .map(|(name, value)| header(name, value))
            .collect(),
    ))
}

/// Set the `User-Agent` header, as [`header`].
pub fn user_agent(agent: impl Into<String>) -> Opt {
    header(http::header::USER_AGENT.as_str(), agent)
}

/// Append one query pair.
pub fn query(name: impl Into<String>, value: impl Into<String>) -> Opt {
    Opt(OptKind::Query(vec![(name.into(), value.into())]))
}

/// Append the query pairs of a serializable value (`Vec` fields repeat the key).
pub fn queries<T: serde::Serialize>(value: &T) -> Opt {
    match crate::to_query_string(value) {
        Ok(query) => Opt(OptKind::Query(
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        )),
        Err(err) => Opt(OptKind::Rejected(err.to_string())),
    }
}

/// Raw body, `application/octet-stream` unless set explicitly. Replaces.
///
/// The content type of a call body replaces a session `Content-Type` header;
/// only a `Content-Type` set on the same call wins over it.
pub fn body(bytes: impl Into<Bytes>) -> Opt {
    bytes_body(bytes.into(), ContentType::OctetStream)
}

/// Text body, `text/plain` unless set explicitly. Replaces.
pub fn text(text: impl Into<String>) -> Opt {
    bytes_body(Bytes::from(text.into()), ContentType::PlainText)
}

/// JSON body, `application/json` unless set explicitly. Replaces.
pub fn json<T: serde::Serialize>(value: &T) -> Opt {
    match crate::to_json(value) {
        Ok(bytes) => bytes_body(bytes, ContentType::Json),
        Err(err) => Opt(OptKind::Rejected(err.to_string())),
    }
}

/// Form body, `application/x-www-form-urlencoded` unless set explicitly. Replaces.
pub fn form<T: serde::Serialize>(value: &T) -> Opt {
    match crate::to_form(value) {
        Ok(bytes) => bytes_body(bytes, ContentType::FormUrlEncoded),
        Err(err) => Opt(OptKind::Rejected(err.to_string())),
    }
}

/// Body read from a file when the request is built. Replaces.
///
/// No content type is implied; set one with [`header`] if the server needs it.
pub fn file(path: impl Into<PathBuf>) -> Opt {
    Opt(OptKind::Body(BodySource::File(path.into())))
}

fn bytes_body(bytes: Bytes, content_type: ContentType) -> Opt {
    Opt(OptKind::Body(BodySource::Bytes {
        bytes,
        content_type: Some(content_type.as_str()),
    }))
}

/// Deadline for the whole call, middleware included. Replaces.
#[must_use]
pub fn timeout(timeout: Duration) -> Opt {
    Opt(OptKind::Timeout(timeout))
}

/// Tunnel through an `http://` proxy. Replaces.
pub fn proxy(proxy: impl Into<String>) -> Opt {
    Opt(OptKind::Proxy(proxy.into()))
}

/// Retry policy, installed as the outermost middleware of the call. Replaces.
///
/// To retry at another position in the chain, add
/// [`middleware::retry`](crate::middleware::retry) through [`middleware`].
#[must_use]
pub fn retry(policy: RetryPolicy) -> Opt {
    Opt(OptKind::Retry(policy))
}

/// Append a middleware to the chain.
#[must_use]
pub fn middleware(middleware: ClientMiddleware) -> Opt {
    Opt(OptKind::Middleware(middleware))
}

/// Accept any server certificate. Replaces.
#[must_use]
pub fn insecure_skip_verify(skip: bool) -> Opt {
    Opt(OptKind::InsecureSkipVerify(skip))
}

/// Maximum idle connections kept per host. Replaces.
#[must_use]
pub fn max_connections(max: usize) -> Opt {
    Opt(OptKind::MaxConnections(max))
}

/// Abort the call when `signal` fires. Replaces.
#[must_use]
pub fn cancel(signal: CancelSignal) -> Opt {
    Opt(OptKind::Cancel(signal))
}

/// Append a middleware setting `Authorization: Bearer <token>`.
///
/// Being inner, a call-level credential overrides a session-level one.
pub fn bearer_auth(token: impl AsRef<str>) -> Opt {
    match BearerAuthLayer::new(token) {
        Ok(layer) => middleware(Middleware::layer("bearer-auth", layer)),
        Err(err) => Opt(OptKind::Rejected(err.to_string())),
    }
}

/// Append a middleware setting `Authorization: Basic <base64(user:pass)>`.
pub fn basic_auth(username: impl AsRef<str>, password: impl AsRef<str>) -> Opt {
    middleware(crate::middleware::basic_auth(username, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_option_carries_content_type() {
        let Opt(OptKind::Body(BodySource::Bytes {
            bytes,
            content_type,
        })) = json(&serde_json::json!({"id": 1}))
        else {
            panic!("expected a body option");
        };
        assert_eq!(bytes.as_ref(), br#"{"id":1}"#);
        assert_eq!(content_type, Some("application/json"));
    }

    #[test]
    fn queries_split_into_pairs() {
        #[derive(serde::Serialize)]
        struct Filter {
            tag: Vec<&'static str>,
            q: &'static str,
        }

        let Opt(OptKind::Query(pairs)) = queries(&Filter {
            tag: vec!["a", "b"],
            q: "x y",
        }) else {
            panic!("expected a query option");
        };
        assert_eq!(
            pairs,
            [
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
                ("q".to_string(), "x y".to_string()),
            ]
        );
    }

    #[test]
    fn unserializable_query_is_rejected_lazily() {
        let opt = queries(&42_u32);
        assert!(matches!(opt.0, OptKind::Rejected(_)));
    }

    #[test]
    fn headers_expand_to_single_headers() {
        let Opt(OptKind::Batch(opts)) = headers([("a", "1"), ("b", "2")]) else {
            panic!("expected a batch");
        };
        assert_eq!(opts.len(), 2);
        assert!(matches!(&opts[0].0, OptKind::Header(name, value) if name == "a" && value == "1"));
    }
}
