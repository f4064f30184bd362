//! sojourn-http
//!
//! HTTP adapters for the sojourn engine: the rate-limited [`OutboundClient`],
//! the upstream [`HttpReservationFetcher`] and a JSON [`HttpSink`].
#![warn(missing_docs)]

/// Throttled reqwest wrapper.
pub mod client;
pub mod fetcher;
pub mod response;
pub mod sink;

pub use client::{BasicAuth, OutboundClient};
pub use fetcher::HttpReservationFetcher;
pub use response::Endpoint;
pub use sink::HttpSink;
