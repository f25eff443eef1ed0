use common::error::{AppError, Res};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::order::MarketplaceItem;

pub async fn get_item(pool: &PgPool, item_id: Uuid) -> Res<Option<MarketplaceItem>> {
    sqlx::query_as::<_, MarketplaceItem>("SELECT * FROM marketplace_items WHERE id = $1")
        .bind(item_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)
}
