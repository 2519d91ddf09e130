//! Prelude module for convenient imports.
//!
//! ```ignore
//! use plexus_core::prelude::*;
//! ```

pub use crate::{
    Body, CancelSignal, ContentType, Error, ErrorKind, Method, Params, Request, RequestBuilder,
    Response, Result, Transport, from_json, to_form, to_json,
};
