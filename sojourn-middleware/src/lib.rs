//! sojourn-middleware
//!
//! Outbound rate limiting: a keyed sliding-window [`RateLimiter`] and the
//! host-scoped [`Throttle`] every HTTP call passes through.

mod rate_limit;
mod throttle;

pub use crate::rate_limit::{RateDecision, RateLimiter};
pub use crate::throttle::{HostSnapshot, Throttle};
