use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use common::error::{AppError, Res};
use db::{
    dtos::subscription::SubscriptionUpsert,
    models::{
        order::OrderStatus,
        subscription::{SubscriptionStatus, SubscriptionTier},
    },
    store::SubscriptionStore,
};

use crate::{
    events::{
        CheckoutSessionObject, EventKind, InvoiceObject, PaymentIntentObject, SubscriptionObject,
        WebhookEvent,
    },
    signature::SignatureVerifier,
};

/// Drives local subscription and order state from provider webhook events.
///
/// Error policy: a bad signature is the only error the endpoint surfaces
/// (the provider must retry those). Once the signature checks out, every
/// event is acknowledged; handler failures are logged and swallowed,
/// because a retried event replays against keyed upserts and converges to
/// the same state anyway.
pub struct WebhookProcessor {
    store: Arc<dyn SubscriptionStore>,
    verifier: SignatureVerifier,
}

impl WebhookProcessor {
    pub fn new(store: Arc<dyn SubscriptionStore>, verifier: SignatureVerifier) -> Self {
        WebhookProcessor { store, verifier }
    }

    /// Verifies and applies one raw webhook delivery. Returns `Err` only
    /// for signature failures; nothing is read from the body before the
    /// signature is checked.
    pub async fn handle(&self, raw_body: &[u8], signature_header: &str) -> Res<()> {
        self.verifier.verify(raw_body, signature_header)?;

        let event: WebhookEvent = match serde_json::from_slice(raw_body) {
            Ok(event) => event,
            Err(err) => {
                // signed but unparseable: a retry would fail identically,
                // so acknowledge and keep the evidence in the log
                log::error!("Webhook body failed to parse after valid signature: {}", err);
                return Ok(());
            }
        };

        log::info!("Processing webhook event: {:?}", event.kind);
        if let Err(err) = self.dispatch(event).await {
            log::error!("Webhook handler failed: {}", err);
        }
        Ok(())
    }

    async fn dispatch(&self, event: WebhookEvent) -> Res<()> {
        match event.kind {
            EventKind::CheckoutCompleted => self.on_checkout_completed(event.data.object).await,
            EventKind::InvoicePaymentSucceeded => self.on_invoice_paid(event.data.object).await,
            EventKind::SubscriptionUpdated => self.on_subscription_updated(event.data.object).await,
            EventKind::SubscriptionDeleted => self.on_subscription_deleted(event.data.object).await,
            EventKind::PaymentIntentSucceeded => {
                self.on_payment_intent(event.data.object, OrderStatus::Paid).await
            }
            EventKind::PaymentIntentFailed => {
                self.on_payment_intent(event.data.object, OrderStatus::Failed).await
            }
            EventKind::Unknown => {
                log::info!("Ignoring unhandled webhook event type");
                Ok(())
            }
        }
    }

    /// A completed checkout activates the subscription and flips the user's
    /// premium flag in one pass. The period is provisional; the invoice
    /// event that follows carries the authoritative bounds.
    async fn on_checkout_completed(&self, object: serde_json::Value) -> Res<()> {
        let session: CheckoutSessionObject = parse_object(object)?;

        let (Some(user_id), Some(tier)) = (&session.metadata.user_id, &session.metadata.tier)
        else {
            log::warn!("Checkout session completed without userId/tier metadata, skipping");
            return Ok(());
        };
        let Ok(user_id) = Uuid::parse_str(user_id) else {
            log::warn!("Checkout session metadata userId is not a uuid, skipping");
            return Ok(());
        };
        let Some(tier) = SubscriptionTier::parse(tier) else {
            log::warn!("Checkout session metadata tier {:?} is unknown, skipping", tier);
            return Ok(());
        };

        let now = Utc::now();
        let upsert = SubscriptionUpsert {
            user_id,
            stripe_customer_id: session.customer.unwrap_or_default(),
            stripe_subscription_id: session.subscription.unwrap_or_default(),
            tier,
            current_period_start: now,
            current_period_end: now + Duration::days(30),
        };

        self.store.upsert_subscription(&upsert).await?;
        self.store.set_premium(user_id, Some(tier)).await?;
        log::info!("Subscription activated for user {} ({})", user_id, tier.as_str());
        Ok(())
    }

    /// A paid invoice is a renewal: overwrite the billing period with the
    /// provider's exact bounds and make sure the premium flag agrees.
    async fn on_invoice_paid(&self, object: serde_json::Value) -> Res<()> {
        let invoice: InvoiceObject = parse_object(object)?;

        let Some(provider_id) = invoice.subscription else {
            // one-off invoices carry no subscription, nothing to renew
            return Ok(());
        };
        let Some(subscription) = self.store.find_by_provider_id(&provider_id).await? else {
            log::warn!("Invoice paid for unknown subscription {}, skipping", provider_id);
            return Ok(());
        };

        self.store
            .refresh_period(
                &provider_id,
                SubscriptionStatus::Active,
                from_epoch(invoice.period_start)?,
                from_epoch(invoice.period_end)?,
            )
            .await?;
        self.store
            .set_premium(subscription.user_id, Some(subscription.tier))
            .await?;
        Ok(())
    }

    /// The provider's many lifecycle statuses collapse to two here: `active`
    /// stays active, everything else (past_due, unpaid, paused, ...) reads
    /// as canceled. The premium flag is re-derived in the same pass so it
    /// can never disagree with the subscription row.
    async fn on_subscription_updated(&self, object: serde_json::Value) -> Res<()> {
        let update: SubscriptionObject = parse_object(object)?;

        let Some(subscription) = self.store.find_by_provider_id(&update.id).await? else {
            log::warn!("Update for unknown subscription {}, skipping", update.id);
            return Ok(());
        };

        let status = if update.status == "active" {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Canceled
        };
        let tier = match status {
            SubscriptionStatus::Active => Some(subscription.tier),
            SubscriptionStatus::Canceled => None,
        };

        self.store
            .refresh_period(
                &update.id,
                status,
                from_epoch(update.current_period_start)?,
                from_epoch(update.current_period_end)?,
            )
            .await?;
        self.store.set_premium(subscription.user_id, tier).await?;
        Ok(())
    }

    /// Terminal state. The row is retired, never deleted, so billing
    /// history survives; deletions for subscriptions we never knew about
    /// are acknowledged without writes.
    async fn on_subscription_deleted(&self, object: serde_json::Value) -> Res<()> {
        let deleted: SubscriptionObject = parse_object(object)?;

        let Some(subscription) = self.store.find_by_provider_id(&deleted.id).await? else {
            log::info!("Deletion of unknown subscription {}, nothing to do", deleted.id);
            return Ok(());
        };

        self.store.cancel_subscription(&deleted.id, Utc::now()).await?;
        self.store.set_premium(subscription.user_id, None).await?;
        log::info!("Subscription {} canceled for user {}", deleted.id, subscription.user_id);
        Ok(())
    }

    /// Marketplace order confirmation. The update is keyed by payment
    /// intent id; an intent with no matching order updates zero rows.
    async fn on_payment_intent(&self, object: serde_json::Value, status: OrderStatus) -> Res<()> {
        let intent: PaymentIntentObject = parse_object(object)?;
        self.store.update_order_status(&intent.id, status).await
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(object: serde_json::Value) -> Res<T> {
    serde_json::from_value(object)
        .map_err(|err| AppError::Internal(format!("malformed event object: {}", err)))
}

fn from_epoch(secs: i64) -> Res<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| AppError::Internal(format!("timestamp {} out of range", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        sync::Mutex,
    };

    use async_trait::async_trait;
    use serde_json::json;

    use db::models::subscription::Subscription;

    use crate::signature::sign_for_tests;

    const SECRET: &str = "whsec_test_secret";

    #[derive(Default)]
    struct MemoryState {
        subscriptions: HashMap<Uuid, Subscription>,
        premium: HashMap<Uuid, Option<SubscriptionTier>>,
        orders: HashMap<String, OrderStatus>,
        writes: u32,
    }

    #[derive(Default)]
    struct MemoryStore {
        state: Mutex<MemoryState>,
    }

    #[async_trait]
    impl SubscriptionStore for MemoryStore {
        async fn upsert_subscription(&self, sub: &SubscriptionUpsert) -> Res<()> {
            let mut state = self.state.lock().unwrap();
            state.writes += 1;
            state.subscriptions.insert(
                sub.user_id,
                Subscription {
                    user_id: sub.user_id,
                    stripe_customer_id: sub.stripe_customer_id.clone(),
                    stripe_subscription_id: sub.stripe_subscription_id.clone(),
                    tier: sub.tier,
                    status: SubscriptionStatus::Active,
                    current_period_start: sub.current_period_start,
                    current_period_end: sub.current_period_end,
                    canceled_at: None,
                },
            );
            Ok(())
        }

        async fn find_by_provider_id(&self, id: &str) -> Res<Option<Subscription>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .subscriptions
                .values()
                .find(|s| s.stripe_subscription_id == id)
                .cloned())
        }

        async fn refresh_period(
            &self,
            id: &str,
            status: SubscriptionStatus,
            period_start: DateTime<Utc>,
            period_end: DateTime<Utc>,
        ) -> Res<()> {
            let mut state = self.state.lock().unwrap();
            state.writes += 1;
            for sub in state.subscriptions.values_mut() {
                if sub.stripe_subscription_id == id {
                    sub.status = status;
                    sub.current_period_start = period_start;
                    sub.current_period_end = period_end;
                }
            }
            Ok(())
        }

        async fn cancel_subscription(&self, id: &str, canceled_at: DateTime<Utc>) -> Res<()> {
            let mut state = self.state.lock().unwrap();
            state.writes += 1;
            for sub in state.subscriptions.values_mut() {
                if sub.stripe_subscription_id == id {
                    sub.status = SubscriptionStatus::Canceled;
                    sub.canceled_at = Some(canceled_at);
                }
            }
            Ok(())
        }

        async fn set_premium(&self, user_id: Uuid, tier: Option<SubscriptionTier>) -> Res<()> {
            let mut state = self.state.lock().unwrap();
            state.writes += 1;
            state.premium.insert(user_id, tier);
            Ok(())
        }

        async fn update_order_status(&self, intent_id: &str, status: OrderStatus) -> Res<()> {
            let mut state = self.state.lock().unwrap();
            state.writes += 1;
            if let Some(existing) = state.orders.get_mut(intent_id) {
                *existing = status;
            }
            Ok(())
        }
    }

    fn processor(store: Arc<MemoryStore>) -> WebhookProcessor {
        WebhookProcessor::new(store, SignatureVerifier::new(SECRET))
    }

    async fn deliver(processor: &WebhookProcessor, event: serde_json::Value) -> Res<()> {
        let body = serde_json::to_vec(&event).unwrap();
        let header = sign_for_tests(SECRET, &body, Utc::now().timestamp());
        processor.handle(&body, &header).await
    }

    fn user() -> Uuid {
        Uuid::parse_str("6f2c0a52-9f3b-4a41-90fd-2d1a4f0f9b11").unwrap()
    }

    fn checkout_event(tier: &str) -> serde_json::Value {
        json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "customer": "cus_123",
                "subscription": "sub_123",
                "metadata": { "userId": user().to_string(), "tier": tier }
            }}
        })
    }

    #[tokio::test]
    async fn checkout_activates_subscription_and_premium_flag() {
        let store = Arc::new(MemoryStore::default());
        deliver(&processor(store.clone()), checkout_event("supporter"))
            .await
            .unwrap();

        let state = store.state.lock().unwrap();
        let sub = state.subscriptions.get(&user()).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.tier, SubscriptionTier::Supporter);
        assert_eq!(sub.stripe_subscription_id, "sub_123");
        assert_eq!(state.premium[&user()], Some(SubscriptionTier::Supporter));
    }

    #[tokio::test]
    async fn replayed_checkout_event_converges_to_one_row() {
        let store = Arc::new(MemoryStore::default());
        let p = processor(store.clone());
        deliver(&p, checkout_event("vip")).await.unwrap();
        deliver(&p, checkout_event("vip")).await.unwrap();

        let state = store.state.lock().unwrap();
        assert_eq!(state.subscriptions.len(), 1);
        assert_eq!(state.subscriptions[&user()].status, SubscriptionStatus::Active);
        assert_eq!(state.premium[&user()], Some(SubscriptionTier::Vip));
    }

    #[tokio::test]
    async fn checkout_without_metadata_is_acknowledged_without_writes() {
        let store = Arc::new(MemoryStore::default());
        let event = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "customer": "cus_123", "subscription": "sub_123" } }
        });
        deliver(&processor(store.clone()), event).await.unwrap();
        assert_eq!(store.state.lock().unwrap().writes, 0);
    }

    #[tokio::test]
    async fn invoice_overwrites_the_period_with_exact_bounds() {
        let store = Arc::new(MemoryStore::default());
        let p = processor(store.clone());
        deliver(&p, checkout_event("supporter")).await.unwrap();

        deliver(&p, json!({
            "type": "invoice.payment_succeeded",
            "data": { "object": {
                "subscription": "sub_123",
                "period_start": 1_700_000_000_i64,
                "period_end": 1_702_592_000_i64
            }}
        }))
        .await
        .unwrap();

        let state = store.state.lock().unwrap();
        let sub = state.subscriptions.get(&user()).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(
            sub.current_period_start,
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
        );
        assert_eq!(
            sub.current_period_end,
            DateTime::<Utc>::from_timestamp(1_702_592_000, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn non_active_provider_status_cancels_and_clears_premium() {
        let store = Arc::new(MemoryStore::default());
        let p = processor(store.clone());
        deliver(&p, checkout_event("supporter")).await.unwrap();

        deliver(&p, json!({
            "type": "customer.subscription.updated",
            "data": { "object": {
                "id": "sub_123",
                "status": "past_due",
                "current_period_start": 1_700_000_000_i64,
                "current_period_end": 1_702_592_000_i64
            }}
        }))
        .await
        .unwrap();

        let state = store.state.lock().unwrap();
        assert_eq!(state.subscriptions[&user()].status, SubscriptionStatus::Canceled);
        assert_eq!(state.premium[&user()], None);
    }

    #[tokio::test]
    async fn deletion_retires_the_row_and_clears_premium() {
        let store = Arc::new(MemoryStore::default());
        let p = processor(store.clone());
        deliver(&p, checkout_event("vip")).await.unwrap();

        deliver(&p, json!({
            "type": "customer.subscription.deleted",
            "data": { "object": {
                "id": "sub_123",
                "status": "canceled",
                "current_period_start": 0_i64,
                "current_period_end": 0_i64
            }}
        }))
        .await
        .unwrap();

        let state = store.state.lock().unwrap();
        let sub = state.subscriptions.get(&user()).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        assert!(sub.canceled_at.is_some());
        assert_eq!(state.premium[&user()], None);
    }

    #[tokio::test]
    async fn deletion_of_unknown_subscription_is_a_noop() {
        let store = Arc::new(MemoryStore::default());
        let result = deliver(&processor(store.clone()), json!({
            "type": "customer.subscription.deleted",
            "data": { "object": {
                "id": "sub_unseen",
                "status": "canceled",
                "current_period_start": 0_i64,
                "current_period_end": 0_i64
            }}
        }))
        .await;

        assert!(result.is_ok());
        assert_eq!(store.state.lock().unwrap().writes, 0);
    }

    #[tokio::test]
    async fn invalid_signature_touches_nothing() {
        let store = Arc::new(MemoryStore::default());
        let p = processor(store.clone());
        let body = serde_json::to_vec(&checkout_event("vip")).unwrap();
        let header = sign_for_tests("whsec_wrong_secret", &body, Utc::now().timestamp());

        let err = p.handle(&body, &header).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature(_)));
        assert_eq!(store.state.lock().unwrap().writes, 0);
        assert!(store.state.lock().unwrap().subscriptions.is_empty());
    }

    #[tokio::test]
    async fn unknown_event_type_is_acknowledged() {
        let store = Arc::new(MemoryStore::default());
        let result = deliver(&processor(store.clone()), json!({
            "type": "customer.created",
            "data": { "object": {} }
        }))
        .await;

        assert!(result.is_ok());
        assert_eq!(store.state.lock().unwrap().writes, 0);
    }

    #[tokio::test]
    async fn signed_but_unparseable_body_is_acknowledged() {
        let store = Arc::new(MemoryStore::default());
        let p = processor(store.clone());
        let body = b"not json at all";
        let header = sign_for_tests(SECRET, body, Utc::now().timestamp());

        assert!(p.handle(body, &header).await.is_ok());
        assert_eq!(store.state.lock().unwrap().writes, 0);
    }

    #[tokio::test]
    async fn payment_intent_events_flip_order_status() {
        let store = Arc::new(MemoryStore::default());
        store
            .state
            .lock()
            .unwrap()
            .orders
            .insert("pi_123".to_string(), OrderStatus::Pending);
        let p = processor(store.clone());

        deliver(&p, json!({
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_123" } }
        }))
        .await
        .unwrap();
        assert_eq!(store.state.lock().unwrap().orders["pi_123"], OrderStatus::Paid);

        deliver(&p, json!({
            "type": "payment_intent.payment_failed",
            "data": { "object": { "id": "pi_123" } }
        }))
        .await
        .unwrap();
        assert_eq!(store.state.lock().unwrap().orders["pi_123"], OrderStatus::Failed);
    }
}
