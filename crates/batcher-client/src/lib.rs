//! HTTP implementation of the pipeline's network seam.
//!
//! [`HttpIndexClient`] posts one batch per request to a search service's
//! document indexing endpoint and maps the response onto the pipeline's
//! tri-state outcome: per-action results, payload too large, or a
//! transport failure.

pub mod error;
pub mod http;

pub use error::ClientError;
pub use http::{build_request_body, classify_response, HttpClientConfig, HttpIndexClient};
