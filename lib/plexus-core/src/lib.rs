//! Core types and traits for the plexus HTTP client/server layer.
//!
//! This crate provides the foundational types used by plexus:
//! - [`Method`] - HTTP method enum
//! - [`Request`], [`RequestBuilder`] and [`RequestSnapshot`] - HTTP request types
//! - [`Response`] and [`Timing`] - buffered HTTP response with round-trip statistics
//! - [`Body`] - streaming body returned by a transport
//! - [`Error`], [`ErrorKind`] and [`Result`] - Error handling
//! - [`Transport`] - terminal transport capability
//! - [`CancelSignal`] - caller-side cancellation
//! - [`Params`] and [`PathTemplate`] - router captures exposed to handlers and middleware
//! - [`StatusCode`] - HTTP status codes (re-exported from `http` crate)
//! - [`header`] - HTTP header names (re-exported from `http` crate)

mod body;
mod cancel;
mod error;
mod method;
mod params;
mod path_template;
pub mod prelude;
mod request;
mod response;
mod transport;

pub use body::{Body, ContentType, StreamingBody, from_json, to_form, to_json, to_query_string};
pub use cancel::CancelSignal;
pub use error::{Error, ErrorKind, Result};
pub use method::Method;
pub use params::Params;
pub use path_template::PathTemplate;
pub use request::{Request, RequestBuilder, RequestSnapshot};
pub use response::{Response, Timing};
pub use transport::{BoxFuture, Transport};

// Re-export http crate types for status codes and headers
pub use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
