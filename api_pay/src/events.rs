use serde::Deserialize;

/// The slice of a Stripe event we act on. The full event object is much
/// larger; everything we do not read stays in `data.object` as raw JSON
/// until the matching handler picks the fields it needs.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Event types the processor dispatches on. Everything else lands on
/// `Unknown` and is acknowledged without side effects, so Stripe never
/// retries events we simply do not care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EventKind {
    #[serde(rename = "checkout.session.completed")]
    CheckoutCompleted,
    #[serde(rename = "invoice.payment_succeeded")]
    InvoicePaymentSucceeded,
    #[serde(rename = "customer.subscription.updated")]
    SubscriptionUpdated,
    #[serde(rename = "customer.subscription.deleted")]
    SubscriptionDeleted,
    #[serde(rename = "payment_intent.succeeded")]
    PaymentIntentSucceeded,
    #[serde(rename = "payment_intent.payment_failed")]
    PaymentIntentFailed,
    #[serde(other)]
    Unknown,
}

/// `data.object` of a `checkout.session.completed` event. The metadata is
/// whatever we attached when the session was created; a session created
/// outside this API carries none, and the handler treats that as a no-op.
#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub customer: Option<String>,
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: CheckoutMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutMetadata {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub tier: Option<String>,
}

/// `data.object` of an `invoice.payment_succeeded` event.
#[derive(Debug, Deserialize)]
pub struct InvoiceObject {
    pub subscription: Option<String>,
    pub period_start: i64,
    pub period_end: i64,
}

/// `data.object` of a `customer.subscription.*` event. The provider has
/// many statuses; everything that is not `active` maps to canceled here.
#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub status: String,
    pub current_period_start: i64,
    pub current_period_end: i64,
}

/// `data.object` of a `payment_intent.*` event.
#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_event_types_parse() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "type": "checkout.session.completed",
            "data": { "object": {} }
        }))
        .unwrap();
        assert_eq!(event.kind, EventKind::CheckoutCompleted);
    }

    #[test]
    fn unrecognized_event_type_parses_as_unknown() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "type": "customer.created",
            "data": { "object": {} }
        }))
        .unwrap();
        assert_eq!(event.kind, EventKind::Unknown);
    }

    #[test]
    fn checkout_session_without_metadata_parses() {
        let session: CheckoutSessionObject = serde_json::from_value(json!({
            "customer": "cus_123",
            "subscription": "sub_123"
        }))
        .unwrap();
        assert!(session.metadata.user_id.is_none());
        assert!(session.metadata.tier.is_none());
    }
}
