//! Session/call configuration merge.
//!
//! A [`RequestConfig`] is the fold of a list of [`Opt`]s. A session keeps one
//! as its frozen base; every call folds its own options into another and
//! [`merge`] combines the two into the [`EffectiveConfig`] the call runs with.
//!
//! - scalars: the call value replaces the session value when set
//! - headers: per-key replace (case-insensitive), other keys accumulate
//! - query pairs and middleware: session first, then call
//! - body: one body; the call body replaces the session body, and its content
//!   type beats a session `Content-Type` header

use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::connector::{ConnectSettings, ProxyTarget};
use crate::middleware::{ClientMiddleware, RetryPolicy};
use crate::opt::{BodySource, Opt, OptKind};
use crate::{CancelSignal, Error, Method, Request, Result};

/// `User-Agent` sent when no option sets one.
pub const DEFAULT_USER_AGENT: &str = concat!("plexus/", env!("CARGO_PKG_VERSION"));

/// Options folded into one configuration, before validation.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    url: Option<String>,
    path: Option<String>,
    method: Option<Method>,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<BodySource>,
    timeout: Option<Duration>,
    proxy: Option<String>,
    retry: Option<RetryPolicy>,
    middleware: Vec<ClientMiddleware>,
    insecure_skip_verify: Option<bool>,
    max_connections: Option<usize>,
    cancel: Option<CancelSignal>,
    rejected: Vec<String>,
}

impl RequestConfig {
    /// An empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold options in order.
    #[must_use]
    pub fn from_options(options: impl IntoIterator<Item = Opt>) -> Self {
        let mut config = Self::new();
        for option in options {
            config.apply(option);
        }
        config
    }

    /// Apply one option.
    pub fn apply(&mut self, option: Opt) {
        match option.0 {
            OptKind::Url(url) => self.url = Some(url),
            OptKind::Path(path) => self.path = Some(path),
            OptKind::Method(method) => self.method = Some(method),
            OptKind::Header(name, value) => {
                self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
                self.headers.push((name, value));
            }
            OptKind::Query(pairs) => self.query.extend(pairs),
            OptKind::Body(body) => self.body = Some(body),
            OptKind::Timeout(timeout) => self.timeout = Some(timeout),
            OptKind::Proxy(proxy) => self.proxy = Some(proxy),
            OptKind::Retry(policy) => self.retry = Some(policy),
            OptKind::Middleware(middleware) => self.middleware.push(middleware),
            OptKind::InsecureSkipVerify(skip) => self.insecure_skip_verify = Some(skip),
            OptKind::MaxConnections(max) => self.max_connections = Some(max),
            OptKind::Cancel(signal) => self.cancel = Some(signal),
            OptKind::Rejected(reason) => self.rejected.push(reason),
            OptKind::Batch(options) => {
                for option in options {
                    self.apply(option);
                }
            }
        }
    }

    /// The URL option, if set.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Header options in application order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Number of middleware options.
    #[must_use]
    pub fn middleware_len(&self) -> usize {
        self.middleware.len()
    }

    /// Validate every option that does not depend on another configuration.
    ///
    /// A missing URL is accepted here: calls may supply it.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found.
    pub fn validate(&self) -> Result<()> {
        if let Some(reason) = self.rejected.first() {
            return Err(Error::configuration(format!("rejected option: {reason}")));
        }
        if let Some(url) = &self.url {
            parse_url(url)?;
        }
        for (name, value) in &self.headers {
            parse_header(name, value)?;
        }
        if let Some(proxy) = &self.proxy {
            ProxyTarget::parse(proxy)?;
        }
        check_retry(self.retry.as_ref())?;
        check_max_connections(self.max_connections)?;
        Ok(())
    }
}

/// The configuration a single call runs with.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<BodySource>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    middleware: Vec<ClientMiddleware>,
    connect: ConnectSettings,
    cancel: Option<CancelSignal>,
}

impl EffectiveConfig {
    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Final URL, path and query included.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Final headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body source.
    #[must_use]
    pub fn body(&self) -> Option<&BodySource> {
        self.body.as_ref()
    }

    /// Deadline for the whole call.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Retry policy installed as the outermost middleware.
    #[must_use]
    pub fn retry(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    /// The complete chain, outermost first: retry, then session middleware,
    /// then call middleware.
    #[must_use]
    pub fn middleware(&self) -> &[ClientMiddleware] {
        &self.middleware
    }

    /// Proxy URL, when tunnelling.
    #[must_use]
    pub fn proxy(&self) -> Option<&Url> {
        self.connect.proxy.as_ref().map(ProxyTarget::url)
    }

    /// Whether certificate verification is disabled.
    #[must_use]
    pub const fn insecure_skip_verify(&self) -> bool {
        self.connect.insecure_skip_verify
    }

    /// Idle connection cap per host.
    #[must_use]
    pub const fn max_connections(&self) -> Option<usize> {
        self.connect.max_connections
    }

    /// Cancel signal observed by the call.
    #[must_use]
    pub fn cancel(&self) -> Option<&CancelSignal> {
        self.cancel.as_ref()
    }

    pub(crate) const fn connect_settings(&self) -> &ConnectSettings {
        &self.connect
    }

    /// Build the request, reading a file body if needed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the body file cannot be read.
    pub async fn build_request(&self) -> Result<Request<Bytes>> {
        let body = match &self.body {
            None => None,
            Some(BodySource::Bytes { bytes, .. }) => Some(bytes.clone()),
            Some(BodySource::File(path)) => {
                let content = tokio::fs::read(path).await.map_err(|err| {
                    Error::configuration(format!("cannot read body file {}: {err}", path.display()))
                })?;
                Some(Bytes::from(content))
            }
        };

        Ok(Request::from_parts(
            self.method,
            self.url.clone(),
            self.headers.clone(),
            body,
        ))
    }
}

/// Merge call options over session options.
///
/// Neither input is modified.
///
/// # Errors
///
/// Returns a configuration error, before any I/O, for a missing or malformed
/// URL, a non-http(s) scheme, a malformed header, an unsupported proxy, a
/// rejected option, zero max-connections or zero retry attempts.
pub fn merge(base: &RequestConfig, overrides: &RequestConfig) -> Result<EffectiveConfig> {
    if let Some(reason) = base.rejected.iter().chain(&overrides.rejected).next() {
        return Err(Error::configuration(format!("rejected option: {reason}")));
    }

    let raw_url = overrides
        .url
        .as_deref()
        .or(base.url.as_deref())
        .ok_or_else(|| Error::configuration("no URL: set one on the session or the call"))?;
    let mut url = parse_url(raw_url)?;

    if let Some(path) = overrides.path.as_deref().or(base.path.as_deref()) {
        join_path(&mut url, path);
    }
    let query = base.query.iter().chain(&overrides.query);
    let mut query = query.peekable();
    if query.peek().is_some() {
        url.query_pairs_mut().extend_pairs(query);
    }

    let mut headers = HeaderMap::new();
    for (name, value) in base.headers.iter().chain(&overrides.headers) {
        let (name, value) = parse_header(name, value)?;
        headers.insert(name, value);
    }
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    }

    // a call body is only overridden by a call Content-Type
    let (body, explicit) = match &overrides.body {
        Some(body) => (Some(body.clone()), overrides.has_header(CONTENT_TYPE.as_str())),
        None => (base.body.clone(), headers.contains_key(CONTENT_TYPE)),
    };
    if let Some(BodySource::Bytes {
        content_type: Some(content_type),
        ..
    }) = &body
    {
        if !explicit {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(*content_type));
        }
    }

    let proxy = overrides
        .proxy
        .as_deref()
        .or(base.proxy.as_deref())
        .map(ProxyTarget::parse)
        .transpose()?;
    let max_connections = overrides.max_connections.or(base.max_connections);
    check_max_connections(max_connections)?;
    let retry = overrides.retry.clone().or_else(|| base.retry.clone());
    check_retry(retry.as_ref())?;

    let middleware = retry
        .iter()
        .map(|policy| crate::middleware::retry(policy.clone()))
        .chain(base.middleware.iter().cloned())
        .chain(overrides.middleware.iter().cloned())
        .collect();

    Ok(EffectiveConfig {
        method: overrides.method.or(base.method).unwrap_or(Method::Get),
        url,
        headers,
        body,
        timeout: overrides.timeout.or(base.timeout),
        retry,
        middleware,
        connect: ConnectSettings {
            proxy,
            insecure_skip_verify: overrides
                .insecure_skip_verify
                .or(base.insecure_skip_verify)
                .unwrap_or(false),
            max_connections,
        },
        cancel: overrides.cancel.clone().or_else(|| base.cancel.clone()),
    })
}

fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|err| Error::configuration(format!("malformed URL `{raw}`: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::configuration(format!(
            "unsupported URL scheme `{other}` in `{raw}`"
        ))),
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::try_from(name)
        .map_err(|_| Error::configuration(format!("malformed header name `{name}`")))?;
    let header_value = HeaderValue::try_from(value)
        .map_err(|_| Error::configuration(format!("malformed value for header `{name}`")))?;
    Ok((header_name, header_value))
}

fn check_retry(policy: Option<&RetryPolicy>) -> Result<()> {
    match policy {
        Some(policy) if policy.max_attempts() == 0 => Err(Error::configuration(
            "retry policy needs at least one attempt",
        )),
        _ => Ok(()),
    }
}

fn check_max_connections(max: Option<usize>) -> Result<()> {
    match max {
        Some(0) => Err(Error::configuration("max connections must be at least 1")),
        _ => Ok(()),
    }
}

/// Append `path` to the URL path with exactly one `/` in between.
fn join_path(url: &mut Url, path: &str) {
    let (path, query) = path.split_once('?').unwrap_or((path, ""));
    let extra = path.trim_start_matches('/');
    if !extra.is_empty() {
        let joined = format!("{}/{extra}", url.path().trim_end_matches('/'));
        url.set_path(&joined);
    }
    if !query.is_empty() {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        url.query_pairs_mut().extend_pairs(pairs);
    }
}
