use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    dtos::subscription::SubscriptionUpsert,
    models::{
        order::OrderStatus,
        subscription::{Subscription, SubscriptionStatus, SubscriptionTier},
    },
    store::SubscriptionStore,
};

/// Postgres-backed store used by the webhook processor in production.
pub struct PgSubscriptionStore {
    pool: Arc<PgPool>,
}

impl PgSubscriptionStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn upsert_subscription(&self, sub: &SubscriptionUpsert) -> Res<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (user_id, stripe_customer_id, stripe_subscription_id, tier, status,
                 current_period_start, current_period_end, canceled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL)
            ON CONFLICT (user_id) DO UPDATE SET
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                tier = EXCLUDED.tier,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                canceled_at = NULL
            "#,
        )
        .bind(sub.user_id)
        .bind(&sub.stripe_customer_id)
        .bind(&sub.stripe_subscription_id)
        .bind(sub.tier)
        .bind(SubscriptionStatus::Active)
        .bind(sub.current_period_start)
        .bind(sub.current_period_end)
        .execute(&*self.pool)
        .await
        .map(|_| ())
        .map_err(AppError::from)
    }

    async fn find_by_provider_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Res<Option<Subscription>> {
        sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE stripe_subscription_id = $1",
        )
        .bind(stripe_subscription_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(AppError::from)
    }

    async fn refresh_period(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Res<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2, current_period_start = $3, current_period_end = $4
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(stripe_subscription_id)
        .bind(status)
        .bind(period_start)
        .bind(period_end)
        .execute(&*self.pool)
        .await
        .map(|_| ())
        .map_err(AppError::from)
    }

    async fn cancel_subscription(
        &self,
        stripe_subscription_id: &str,
        canceled_at: DateTime<Utc>,
    ) -> Res<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2, canceled_at = $3
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(stripe_subscription_id)
        .bind(SubscriptionStatus::Canceled)
        .bind(canceled_at)
        .execute(&*self.pool)
        .await
        .map(|_| ())
        .map_err(AppError::from)
    }

    async fn set_premium(&self, user_id: Uuid, tier: Option<SubscriptionTier>) -> Res<()> {
        sqlx::query("UPDATE users SET is_premium = $2, premium_tier = $3 WHERE id = $1")
            .bind(user_id)
            .bind(tier.is_some())
            .bind(tier)
            .execute(&*self.pool)
            .await
            .map(|_| ())
            .map_err(AppError::from)
    }

    async fn update_order_status(&self, payment_intent_id: &str, status: OrderStatus) -> Res<()> {
        sqlx::query("UPDATE orders SET status = $2 WHERE payment_intent_id = $1")
            .bind(payment_intent_id)
            .bind(status)
            .execute(&*self.pool)
            .await
            .map(|_| ())
            .map_err(AppError::from)
    }
}

/// Route-side read: the authenticated user's subscription row, if any.
pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)
}
