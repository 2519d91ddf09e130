//! HTTP client sessions and server routing built on Tower.
//!
//! - [`Session`] holds default options; each call layers its own [`opt`]
//!   options on top ([`merge`]) and runs through the composed client
//!   [`middleware`] chain down to a [`Transport`].
//! - [`server::Mux`] routes inbound requests by method and path, with static
//!   and parameterized segments, and wraps handlers in server middleware.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use plexus::prelude::*;
//!
//! #[derive(Debug, Deserialize)]
//! pub struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! let session = Session::builder()
//!     .option(opt::url("https://api.example.com"))
//!     .option(opt::timeout(Duration::from_secs(5)))
//!     .option(opt::middleware(middleware::logging()))
//!     .build()?;
//!
//! let user: User = session.get("/users/42", []).await?.json()?;
//! ```

pub mod chain;
mod config;
mod connector;
pub mod merge;
pub mod middleware;
pub mod opt;
pub mod prelude;
pub mod server;
mod session;
mod transport;

pub use chain::{Middleware, Next, compose};
pub use config::{SessionConfig, TransportConfig, TransportConfigBuilder};
pub use merge::{EffectiveConfig, RequestConfig};
pub use opt::{BodySource, Opt};
pub use session::{Session, SessionBuilder};
pub use transport::HyperTransport;

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use plexus_core::{
    Body, BoxFuture, CancelSignal, ContentType, Error, ErrorKind, Method, Params, PathTemplate,
    Request, RequestBuilder, RequestSnapshot, Response, Result, StreamingBody, Timing, Transport,
    from_json, to_form, to_json, to_query_string,
};

// Re-export http types for status codes and headers
pub use plexus_core::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};

pub use url;
