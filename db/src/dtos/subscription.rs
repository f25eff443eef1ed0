use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::subscription::SubscriptionTier;

/// Everything a `checkout.session.completed` event carries that we persist.
/// Keyed by `user_id`; applying it twice yields the same row.
#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    pub user_id: Uuid,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub tier: SubscriptionTier,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
}
