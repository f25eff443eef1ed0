use actix_web::{HttpRequest, Responder, post, web};
use serde_json::json;

use common::{
    error::{AppError, Res},
    http::Success,
};

use crate::{processor::WebhookProcessor, signature::SIGNATURE_HEADER};

/// Receives Stripe webhook deliveries.
///
/// The body must stay `web::Bytes`: the signature covers the raw bytes on
/// the wire, and running them through a JSON extractor first would both
/// break verification and read the payload before it is authenticated.
///
/// # Output
/// - Success: `{"received": true}`; sent even when the handler declined
///   the event, so the provider does not retry what cannot succeed
/// - Error: 400 INVALID_SIGNATURE when verification fails
#[post("/stripe")]
async fn post_stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    processor: web::Data<WebhookProcessor>,
) -> Res<impl Responder> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| {
            AppError::InvalidSignature("missing stripe-signature header".to_string())
        })?;

    processor.handle(&body, signature).await?;
    Success::ok(json!({ "received": true }))
}
