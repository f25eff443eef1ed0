use actix_web::{Responder, get, post, web};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use stripe::Client;
use uuid::Uuid;

use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
    identity::Identity,
};
use db::models::{order::Order, subscription::SubscriptionTier};

use crate::{
    dtos::pay::{
        CheckoutRequest, CheckoutResponse, OrdersPage, OrdersQuery, PaymentIntentRequest,
        PaymentIntentResponse,
    },
    services,
};

const ORDERS_DEFAULT_LIMIT: i64 = 25;
const ORDERS_MAX_LIMIT: i64 = 100;

/// Starts a subscription checkout for the authenticated user.
///
/// # Input
/// - `req`: JSON payload with `tier` ("supporter" or "vip")
///
/// # Output
/// - Success: `{session_id, url}`; the client redirects to `url`
/// - Error: 400 for an unknown tier, 500 if the provider call fails
#[post("/checkout")]
async fn post_checkout(
    identity: web::ReqData<Identity>,
    req: web::Json<CheckoutRequest>,
    pool: web::Data<PgPool>,
    client: web::Data<Client>,
    config: web::Data<Config>,
) -> Res<impl Responder> {
    let tier = SubscriptionTier::parse(&req.tier)
        .ok_or_else(|| AppError::invalid_input("tier must be \"supporter\" or \"vip\"", "tier"))?;

    let session = services::checkout::create_subscription_checkout(
        &client,
        &pool,
        &config,
        &identity,
        tier,
    )
    .await?;

    Success::ok(CheckoutResponse {
        session_id: session.id.to_string(),
        url: session.url.unwrap_or_default(),
    })
}

/// Creates a payment intent for a marketplace purchase and records the
/// pending order.
///
/// # Input
/// - `req`: JSON payload with `item_id` and optional `quantity`
///
/// # Output
/// - Success: `{client_secret, payment_intent_id, order_id}` with 201
/// - Error: 404 if the item does not exist, 403 when buying your own item
#[post("/payment-intent")]
async fn post_payment_intent(
    identity: web::ReqData<Identity>,
    req: web::Json<PaymentIntentRequest>,
    pool: web::Data<PgPool>,
    client: web::Data<Client>,
) -> Res<impl Responder> {
    let (order, client_secret) =
        services::order::create_order_intent(&client, &pool, &identity, &req).await?;

    Success::created(PaymentIntentResponse {
        client_secret,
        payment_intent_id: order.payment_intent_id.clone(),
        order_id: order.id,
    })
}

/// Returns the authenticated user's subscription row.
///
/// # Output
/// - Success: the subscription, including status and billing period
/// - Error: 404 when the user never subscribed
#[get("/subscription")]
async fn get_subscription(
    identity: web::ReqData<Identity>,
    pool: web::Data<PgPool>,
) -> Res<impl Responder> {
    let subscription = db::subscription::find_by_user(&pool, identity.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("subscription".to_string()))?;

    Success::ok(subscription)
}

/// Returns the authenticated user's order history, newest first.
///
/// # Input
/// - `cursor`: opaque cursor from the previous page (optional)
/// - `limit`: page size, capped at 100 (optional)
///
/// # Output
/// - Success: `{items, next_cursor}`; `next_cursor` is absent on the
///   last page
#[get("/orders")]
async fn get_orders(
    identity: web::ReqData<Identity>,
    query: web::Query<OrdersQuery>,
    pool: web::Data<PgPool>,
) -> Res<impl Responder> {
    let limit = query
        .limit
        .unwrap_or(ORDERS_DEFAULT_LIMIT)
        .clamp(1, ORDERS_MAX_LIMIT);
    let cursor = query.cursor.as_deref().map(decode_cursor).transpose()?;

    let items = db::order::list_orders_by_buyer(&pool, identity.user_id, cursor, limit).await?;

    // a full page may be the last one; the next request then comes back empty
    let next_cursor = if items.len() as i64 == limit {
        items.last().map(encode_cursor)
    } else {
        None
    };

    Success::ok(OrdersPage { items, next_cursor })
}

fn encode_cursor(order: &Order) -> String {
    format!("{}|{}", order.created_at.to_rfc3339(), order.id)
}

fn decode_cursor(raw: &str) -> Res<(DateTime<Utc>, Uuid)> {
    let invalid = || AppError::invalid_input("cursor is not valid", "cursor");

    let (timestamp, id) = raw.split_once('|').ok_or_else(invalid)?;
    let created_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| invalid())?
        .with_timezone(&Utc);
    let id = Uuid::parse_str(id).map_err(|_| invalid())?;
    Ok((created_at, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::order::OrderStatus;

    #[test]
    fn cursor_round_trips_through_encode_and_decode() {
        let order = Order {
            id: Uuid::parse_str("a2f9d8be-3c14-4f7a-8e05-64c2b7f1d903").unwrap(),
            buyer_id: Uuid::nil(),
            seller_id: Uuid::nil(),
            item_id: Uuid::nil(),
            quantity: 1,
            total_cents: 2500,
            payment_intent_id: "pi_123".to_string(),
            status: OrderStatus::Pending,
            created_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        };

        let (created_at, id) = decode_cursor(&encode_cursor(&order)).unwrap();
        assert_eq!(created_at, order.created_at);
        assert_eq!(id, order.id);
    }

    #[test]
    fn garbage_cursors_are_invalid_input() {
        for raw in ["", "no-separator", "2023-11-14|not-a-uuid", "not-a-date|a2f9d8be-3c14-4f7a-8e05-64c2b7f1d903"] {
            let err = decode_cursor(raw).unwrap_err();
            assert!(matches!(err, AppError::InvalidInput { .. }), "cursor {:?}", raw);
        }
    }
}
