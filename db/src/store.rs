use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::Res;
use uuid::Uuid;

use crate::{
    dtos::subscription::SubscriptionUpsert,
    models::{
        order::OrderStatus,
        subscription::{Subscription, SubscriptionStatus, SubscriptionTier},
    },
};

/// The mutations the webhook processor performs, abstracted so the state
/// machine can be driven against an in-memory store in tests. Every method
/// is a keyed upsert or update; none append.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert-or-overwrite the subscription row for a user (upsert key is
    /// the user id; at most one row per user).
    async fn upsert_subscription(&self, sub: &SubscriptionUpsert) -> Res<()>;

    /// Look up a subscription by the payment provider's subscription id.
    async fn find_by_provider_id(&self, stripe_subscription_id: &str)
    -> Res<Option<Subscription>>;

    /// Overwrite status and billing period, keyed by provider subscription id.
    async fn refresh_period(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Res<()>;

    /// Retire a subscription: status becomes canceled, `canceled_at` is
    /// stamped. The row is never deleted.
    async fn cancel_subscription(
        &self,
        stripe_subscription_id: &str,
        canceled_at: DateTime<Utc>,
    ) -> Res<()>;

    /// Re-derive the denormalized premium flag pair on the user row.
    /// `None` clears it.
    async fn set_premium(&self, user_id: Uuid, tier: Option<SubscriptionTier>) -> Res<()>;

    /// Flip an order's status, keyed by the payment intent that funds it.
    async fn update_order_status(&self, payment_intent_id: &str, status: OrderStatus) -> Res<()>;
}
