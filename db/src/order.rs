use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::order::Order;

#[derive(Debug, Clone)]
pub struct OrderCreate {
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub item_id: Uuid,
    pub quantity: i32,
    pub total_cents: i64,
    pub payment_intent_id: String,
}

pub async fn insert_order(pool: &PgPool, data: &OrderCreate) -> Res<Order> {
    sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders
            (buyer_id, seller_id, item_id, quantity, total_cents, payment_intent_id, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending')
        RETURNING *
        "#,
    )
    .bind(data.buyer_id)
    .bind(data.seller_id)
    .bind(data.item_id)
    .bind(data.quantity)
    .bind(data.total_cents)
    .bind(&data.payment_intent_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from)
}

/// Cursor-paginated order history for a buyer, newest first. The cursor is
/// the `(created_at, id)` pair of the last row of the previous page; the id
/// breaks timestamp ties so concurrent inserts with identical timestamps
/// cannot duplicate or skip a row across pages.
pub async fn list_orders_by_buyer(
    pool: &PgPool,
    buyer_id: Uuid,
    cursor: Option<(DateTime<Utc>, Uuid)>,
    limit: i64,
) -> Res<Vec<Order>> {
    let query = match cursor {
        Some((created_at, id)) => sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE buyer_id = $1 AND (created_at, id) < ($2, $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(buyer_id)
        .bind(created_at)
        .bind(id)
        .bind(limit),
        None => sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE buyer_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(buyer_id)
        .bind(limit),
    };

    query.fetch_all(pool).await.map_err(AppError::from)
}
