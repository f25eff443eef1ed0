use std::collections::HashMap;

use sqlx::PgPool;
use stripe::{Client, CreatePaymentIntent, Currency, PaymentIntent};

use common::{
    error::{AppError, Res},
    identity::Identity,
};
use db::{
    models::order::Order,
    order::OrderCreate,
};

use crate::dtos::pay::PaymentIntentRequest;

/// Creates a payment intent for a marketplace purchase and records the
/// matching pending order. The order is keyed by the intent id, which is
/// how the `payment_intent.*` webhooks later find it to confirm or fail
/// the purchase.
pub async fn create_order_intent(
    client: &Client,
    pool: &PgPool,
    buyer: &Identity,
    request: &PaymentIntentRequest,
) -> Res<(Order, String)> {
    let quantity = request.quantity.unwrap_or(1);
    if quantity < 1 {
        return Err(AppError::invalid_input(
            "quantity must be at least 1",
            "quantity",
        ));
    }

    let item = db::marketplace::get_item(pool, request.item_id)
        .await?
        .ok_or_else(|| AppError::NotFound("item".to_string()))?;
    if item.seller_id == buyer.user_id {
        return Err(AppError::Forbidden(
            "you cannot purchase your own item".to_string(),
        ));
    }

    let total_cents = item.price_cents * i64::from(quantity);

    let mut metadata = HashMap::new();
    metadata.insert("itemId".to_string(), item.id.to_string());
    metadata.insert("buyerId".to_string(), buyer.user_id.to_string());
    metadata.insert("sellerId".to_string(), item.seller_id.to_string());

    let mut params = CreatePaymentIntent::new(total_cents, Currency::CAD);
    params.payment_method_types = Some(vec!["card".to_string()]);
    params.metadata = Some(metadata);

    let intent = PaymentIntent::create(client, params).await?;
    let client_secret = intent
        .client_secret
        .clone()
        .ok_or_else(|| AppError::Internal("payment intent has no client secret".to_string()))?;

    let order = db::order::insert_order(
        pool,
        &OrderCreate {
            buyer_id: buyer.user_id,
            seller_id: item.seller_id,
            item_id: item.id,
            quantity,
            total_cents,
            payment_intent_id: intent.id.to_string(),
        },
    )
    .await?;

    Ok((order, client_secret))
}
