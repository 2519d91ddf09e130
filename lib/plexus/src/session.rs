//! Sessions and the request executor.
//!
//! A [`Session`] holds default options and a shared transport. Each call
//! merges its own options over the defaults, composes the effective
//! middleware chain around the terminal transport and runs it under the
//! effective timeout and cancel signal.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use plexus::{Session, opt};
//!
//! let session = Session::builder()
//!     .option(opt::url("https://api.example.com"))
//!     .option(opt::timeout(Duration::from_secs(5)))
//!     .build()?;
//!
//! let response = session.get("/users/42", [opt::header("accept", "application/json")]).await?;
//! let user: User = response.json()?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Instant, SystemTime};

use bytes::Bytes;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};
use tracing::debug;

use crate::chain::compose;
use crate::config::TransportConfig;
use crate::merge::{EffectiveConfig, RequestConfig, merge};
use crate::opt::{self, Opt};
use crate::transport::HyperTransport;
use crate::{BoxFuture, Error, Method, Request, Response, Result, Timing, Transport};

/// Long-lived holder of default options and a shared transport.
///
/// Cloning is cheap; clones share the configuration and the connection pool.
/// No call changes the session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    base: RequestConfig,
    transport: SessionTransport,
}

enum SessionTransport {
    Hyper {
        shared: HyperTransport,
        config: TransportConfig,
    },
    Custom(Arc<dyn Transport>),
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transport = match &self.inner.transport {
            SessionTransport::Hyper { .. } => "hyper",
            SessionTransport::Custom(_) => "custom",
        };
        f.debug_struct("Session")
            .field("base", &self.inner.base)
            .field("transport", &transport)
            .finish()
    }
}

impl Session {
    /// Start building a session.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// The frozen session options.
    #[must_use]
    pub fn config(&self) -> &RequestConfig {
        &self.inner.base
    }

    /// Merge `options` over the session options without sending anything.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the merged configuration is invalid.
    pub fn effective(&self, options: impl IntoIterator<Item = Opt>) -> Result<EffectiveConfig> {
        merge(&self.inner.base, &RequestConfig::from_options(options))
    }

    /// Run one call with the given options.
    ///
    /// # Errors
    ///
    /// - configuration errors, before any I/O
    /// - network errors from the transport, [`Error::Timeout`], [`Error::Canceled`]
    /// - whatever a middleware returns (e.g. [`Error::Http`] from `raise_for_status`)
    pub async fn execute(&self, options: impl IntoIterator<Item = Opt>) -> Result<Response> {
        let effective = self.effective(options)?;
        self.execute_effective(&effective).await
    }

    /// Run one call with an already merged configuration.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn execute_effective(&self, effective: &EffectiveConfig) -> Result<Response> {
        let request = effective.build_request().await?;
        let transport = self.transport_for(effective)?;

        let terminal = BoxCloneSyncService::new(Terminal { transport });
        let chain = compose(terminal, effective.middleware());
        let call = chain.oneshot(request);

        let call = async {
            match effective.timeout() {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .unwrap_or_else(|_elapsed| Err(Error::Timeout)),
                None => call.await,
            }
        };

        match effective.cancel() {
            Some(signal) => {
                tokio::select! {
                    biased;
                    () = signal.cancelled() => Err(Error::Canceled),
                    result = call => result,
                }
            }
            None => call.await,
        }
    }

    /// `GET` a URL (absolute) or a path (relative to the session URL).
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn get(&self, target: &str, options: impl IntoIterator<Item = Opt>) -> Result<Response> {
        self.send(Method::Get, target, options).await
    }

    /// `POST`, see [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn post(&self, target: &str, options: impl IntoIterator<Item = Opt>) -> Result<Response> {
        self.send(Method::Post, target, options).await
    }

    /// `PUT`, see [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn put(&self, target: &str, options: impl IntoIterator<Item = Opt>) -> Result<Response> {
        self.send(Method::Put, target, options).await
    }

    /// `PATCH`, see [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn patch(&self, target: &str, options: impl IntoIterator<Item = Opt>) -> Result<Response> {
        self.send(Method::Patch, target, options).await
    }

    /// `DELETE`, see [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn delete(&self, target: &str, options: impl IntoIterator<Item = Opt>) -> Result<Response> {
        self.send(Method::Delete, target, options).await
    }

    /// `HEAD`, see [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn head(&self, target: &str, options: impl IntoIterator<Item = Opt>) -> Result<Response> {
        self.send(Method::Head, target, options).await
    }

    async fn send(
        &self,
        method: Method,
        target: &str,
        options: impl IntoIterator<Item = Opt>,
    ) -> Result<Response> {
        let target = if is_absolute(target) {
            opt::url(target)
        } else {
            opt::path(target)
        };
        self.execute([opt::method(method), target].into_iter().chain(options))
            .await
    }

    fn transport_for(&self, effective: &EffectiveConfig) -> Result<Arc<dyn Transport>> {
        match &self.inner.transport {
            SessionTransport::Custom(transport) => Ok(Arc::clone(transport)),
            SessionTransport::Hyper { shared, config } => {
                let settings = effective.connect_settings();
                if shared.settings() == settings {
                    return Ok(Arc::new(shared.clone()));
                }
                debug!(
                    proxy = ?effective.proxy().map(url::Url::as_str),
                    insecure = settings.insecure_skip_verify,
                    max_connections = ?settings.max_connections,
                    "building a dedicated transport for this call"
                );
                Ok(Arc::new(HyperTransport::with_settings(config, settings.clone())?))
            }
        }
    }
}

/// `http(s)` URLs replace the session URL; anything else is a path, even with a `:`.
fn is_absolute(target: &str) -> bool {
    target.contains("://")
        || url::Url::parse(target).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Builder for [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    options: Vec<Opt>,
    transport: Option<Arc<dyn Transport>>,
    transport_config: TransportConfig,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("options", &self.options.len())
            .field("custom_transport", &self.transport.is_some())
            .field("transport_config", &self.transport_config)
            .finish()
    }
}

impl SessionBuilder {
    /// Add a default option.
    #[must_use]
    pub fn option(mut self, option: Opt) -> Self {
        self.options.push(option);
        self
    }

    /// Add several default options.
    #[must_use]
    pub fn options(mut self, options: impl IntoIterator<Item = Opt>) -> Self {
        self.options.extend(options);
        self
    }

    /// Use `transport` instead of the built-in hyper transport.
    ///
    /// Proxy, TLS and connection-cap options are then the transport's business.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Connection settings of the built-in hyper transport.
    #[must_use]
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Validate the options and build the session.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for any invalid option, or a TLS error if
    /// the hyper transport cannot be set up.
    pub fn build(self) -> Result<Session> {
        let base = RequestConfig::from_options(self.options);
        base.validate()?;

        let transport = match self.transport {
            Some(transport) => SessionTransport::Custom(transport),
            None => {
                let settings = match base.url() {
                    Some(_) => merge(&base, &RequestConfig::new())?.connect_settings().clone(),
                    None => {
                        let probe = RequestConfig::from_options([opt::url("http://localhost")]);
                        merge(&base, &probe)?.connect_settings().clone()
                    }
                };
                SessionTransport::Hyper {
                    shared: HyperTransport::with_settings(&self.transport_config, settings)?,
                    config: self.transport_config,
                }
            }
        };

        Ok(Session {
            inner: Arc::new(SessionInner { base, transport }),
        })
    }
}

/// Innermost service: one transport round trip plus the body drain.
#[derive(Clone)]
struct Terminal {
    transport: Arc<dyn Transport>,
}

impl Service<Request<Bytes>> for Terminal {
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response<Bytes>>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let transport = Arc::clone(&self.transport);
        Box::pin(async move {
            let snapshot = request.snapshot();
            let started_at = SystemTime::now();
            let start = Instant::now();

            let (head, body) = transport.round_trip(request).await?.split_body();
            // the stream is consumed and dropped here, whatever happens
            let (bytes, body_error) = body.collect().await;

            let timing = Timing {
                started_at,
                finished_at: SystemTime::now(),
                elapsed: start.elapsed(),
            };
            let mut response = head
                .map_body(|()| bytes)
                .with_timing(timing)
                .with_request(snapshot);
            if let Some(err) = body_error {
                debug!(error = %err, "response body truncated");
                response = response.with_body_error(err);
            }
            Ok(response)
        })
    }
}
