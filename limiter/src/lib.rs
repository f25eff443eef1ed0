use std::sync::Arc;

use fixed_window::{FixedWindowLimiter, RateQuota};
use middleware::tier::TierLimiter;

pub mod fixed_window;

pub mod middleware {
    pub mod tier;
}

/// Gates a scope with one named budget tier. All tiers share the same
/// limiter instance; each tier is tracked independently per identifier.
pub fn tier_middleware(
    limiter: Arc<FixedWindowLimiter>,
    tier: &'static str,
    quota: RateQuota,
) -> TierLimiter {
    TierLimiter::new(limiter, tier, quota)
}
