//! HTTP plumbing: a thin reqwest wrapper that owns the base URL, the
//! mandatory OData headers, and request construction for single
//! operations and whole batches. Retry and error classification live a
//! layer up, in [`crate::execute`].

mod http;

pub use http::HttpTransport;
