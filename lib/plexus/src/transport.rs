//! Hyper-backed [`Transport`] with connection pooling and TLS.

use std::fmt;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::{BodyStream, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::TransportConfig;
use crate::connector::{ConnectSettings, TunnelConnector, https_connector};
use crate::{Body, BoxFuture, Error, Request, Response, Result, Transport};

/// HTTP transport using hyper-util, pooling connections per host.
///
/// Cloning is cheap and clones share the pool.
///
/// # Example
///
/// ```ignore
/// use plexus::{HyperTransport, TransportConfig};
///
/// let transport = HyperTransport::new(&TransportConfig::default())?;
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<HttpsConnector<TunnelConnector>, Full<Bytes>>,
    settings: ConnectSettings,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// A direct, certificate-verifying transport.
    ///
    /// # Errors
    ///
    /// Returns a TLS error if the TLS configuration cannot be built.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        Self::with_settings(config, ConnectSettings::default())
    }

    pub(crate) fn with_settings(config: &TransportConfig, settings: ConnectSettings) -> Result<Self> {
        let connector = https_connector(config, &settings)?;

        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(settings.max_connections.unwrap_or(config.pool_idle_per_host))
            .build(connector);

        Ok(Self { inner, settings })
    }

    pub(crate) const fn settings(&self) -> &ConnectSettings {
        &self.settings
    }

    /// Build a hyper request from a plexus request.
    fn build_hyper_request(request: Request<Bytes>) -> Result<http::Request<Full<Bytes>>> {
        let (method, url, headers, body) = request.into_parts();

        let mut http_request = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str())
            .body(body.map_or_else(Full::default, Full::new))
            .map_err(|e| Error::configuration(format!("cannot build request for {url}: {e}")))?;
        *http_request.headers_mut() = headers;

        Ok(http_request)
    }

    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Body>> {
        let hyper_request = Self::build_hyper_request(request)?;

        let response = self
            .inner
            .request(hyper_request)
            .await
            .map_err(Self::map_hyper_error)?;

        let (parts, incoming) = response.into_parts();
        let body = Body::from_stream(
            BodyStream::new(incoming)
                .map_ok(|frame| frame.into_data().unwrap_or_default())
                .map_err(|e| Error::decode(e.to_string())),
        );

        Ok(Response::new(parts.status.as_u16(), parts.headers, body))
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = match std::error::Error::source(&err) {
            Some(source) => format!("{err}: {source}"),
            None => err.to_string(),
        };
        let lower = msg.to_ascii_lowercase();

        if lower.contains("ssl") || lower.contains("tls") || lower.contains("certificate") {
            return Error::tls(msg);
        }

        Error::connection(msg)
    }
}

impl Transport for HyperTransport {
    fn round_trip(&self, request: Request<Bytes>) -> BoxFuture<'static, Result<Response<Body>>> {
        let transport = self.clone();
        Box::pin(async move { transport.execute(request).await })
    }
}
