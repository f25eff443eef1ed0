use serde::{Deserialize, Serialize};
use uuid::Uuid;

use db::models::order::Order;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// "supporter" or "vip".
    pub tier: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    /// Hosted checkout page the client redirects to.
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentRequest {
    pub item_id: Uuid,
    /// Defaults to 1.
    pub quantity: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    /// Opaque cursor from the previous page's `next_cursor`.
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrdersPage {
    pub items: Vec<Order>,
    /// Absent on the last page.
    pub next_cursor: Option<String>,
}
