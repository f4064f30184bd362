//! Per-destination-host outbound budgets.

use std::collections::BTreeMap;

use sojourn_types::{HostBudget, RateLimitConfig, SyncError};
use url::Url;

use crate::rate_limit::RateLimiter;

/// Remaining budget for one configured host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSnapshot {
    /// Configured budget.
    pub budget: HostBudget,
    /// Attempts left in the current window.
    pub remaining: u32,
}

/// Applies [`RateLimitConfig`] budgets to outbound URLs.
///
/// Hosts without a configured budget are unlimited.
#[derive(Debug, Default)]
pub struct Throttle {
    config: RateLimitConfig,
    limiter: RateLimiter,
}

impl Throttle {
    /// Throttle using the given budgets.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            limiter: RateLimiter::new(),
        }
    }

    /// Admit one request to `url`.
    ///
    /// # Errors
    /// Returns `SyncError::RateLimited` scoped to the host when its budget is spent.
    pub fn admit(&self, url: &Url) -> Result<(), SyncError> {
        let Some(host) = url.host_str() else {
            return Ok(());
        };
        let host = host.to_ascii_lowercase();
        let Some(budget) = self.config.budget_for(&host) else {
            return Ok(());
        };
        let decision = self
            .limiter
            .attempt(&host, budget.max_attempts, budget.window);
        if decision.allowed {
            return Ok(());
        }
        let wait = decision.retry_after;
        let retry_after_secs = (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1);
        tracing::warn!(host = %host, retry_after_secs, "outbound rate limit reached");
        Err(SyncError::rate_limited(host, retry_after_secs))
    }

    /// Remaining budget for every configured host.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, HostSnapshot> {
        self.config
            .hosts
            .iter()
            .map(|(host, budget)| {
                let key = host.to_ascii_lowercase();
                let remaining = self
                    .limiter
                    .remaining(&key, budget.max_attempts, budget.window);
                (
                    key,
                    HostSnapshot {
                        budget: *budget,
                        remaining,
                    },
                )
            })
            .collect()
    }
}
