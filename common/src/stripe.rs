use std::collections::HashMap;

use stripe::{Client, CreateCustomer, Customer};
use uuid::Uuid;

use crate::error::{AppError, Res};

pub fn create_client(secret_key: &str) -> Client {
    Client::new(secret_key)
}

/// Creates a Stripe customer tagged with our user id so webhook events can
/// always be traced back to a platform account.
pub async fn create_customer(client: &Client, user_id: Uuid, email: &str) -> Res<Customer> {
    let mut metadata = HashMap::new();
    metadata.insert("userId".to_string(), user_id.to_string());

    let params = CreateCustomer {
        email: Some(email),
        metadata: Some(metadata),
        ..Default::default()
    };

    Customer::create(client, params)
        .await
        .map_err(AppError::from)
}
