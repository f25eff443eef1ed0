use std::collections::HashMap;

use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CustomerId,
};

use common::{
    env_config::Config,
    error::{AppError, Res},
    identity::Identity,
};
use db::models::subscription::SubscriptionTier;

/// Starts a hosted checkout for a paid tier.
///
/// The session metadata carries the user id and tier; that metadata is the
/// only link the completion webhook has back to a platform account, so a
/// session without it would activate nothing.
pub async fn create_subscription_checkout(
    client: &Client,
    pool: &PgPool,
    config: &Config,
    identity: &Identity,
    tier: SubscriptionTier,
) -> Res<CheckoutSession> {
    let customer_id = resolve_customer(client, pool, identity).await?;

    let price_id = match tier {
        SubscriptionTier::Supporter => &config.price_id_supporter,
        SubscriptionTier::Vip => &config.price_id_vip,
    };

    let mut metadata = HashMap::new();
    metadata.insert("userId".to_string(), identity.user_id.to_string());
    metadata.insert("tier".to_string(), tier.as_str().to_string());

    let params = CreateCheckoutSession {
        mode: Some(CheckoutSessionMode::Subscription),
        customer: Some(customer_id),
        line_items: Some(vec![CreateCheckoutSessionLineItems {
            price: Some(price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]),
        success_url: Some(&config.checkout_success_url),
        cancel_url: Some(&config.checkout_cancel_url),
        metadata: Some(metadata),
        ..Default::default()
    };

    CheckoutSession::create(client, params)
        .await
        .map_err(AppError::from)
}

/// Reuses the Stripe customer from an earlier subscription when one exists,
/// so a user who re-subscribes keeps one customer record on the provider
/// side instead of accumulating duplicates.
async fn resolve_customer(
    client: &Client,
    pool: &PgPool,
    identity: &Identity,
) -> Res<CustomerId> {
    if let Some(existing) = db::subscription::find_by_user(pool, identity.user_id).await?
        && !existing.stripe_customer_id.is_empty()
    {
        return existing
            .stripe_customer_id
            .parse::<CustomerId>()
            .map_err(|_| AppError::Internal("stored customer id is malformed".to_string()));
    }

    let customer =
        common::stripe::create_customer(client, identity.user_id, &identity.email).await?;
    Ok(customer.id)
}
