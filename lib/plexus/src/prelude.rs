//! Prelude module for convenient imports.
//!
//! ```ignore
//! use plexus::prelude::*;
//! ```

pub use crate::server::{Mux, RequestExt, handler_fn};
pub use crate::{
    CancelSignal, ContentType, Error, Method, Opt, Request, Response, Result, Session, StatusCode,
    header, middleware, opt,
};
pub use serde::{Deserialize, Serialize};
