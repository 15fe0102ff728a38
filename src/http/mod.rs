//! HTTP client module
//!
//! Provides the HTTP transport used by the script `fetch` capability.

mod client;

pub use client::{HttpClient, HttpError, HttpRequest, HttpResponse, DEFAULT_TIMEOUT};
