use actix_web::web;

pub mod events;
pub mod processor;
pub mod signature;

pub mod routes {
    pub mod pay;
    pub mod webhook;
}

pub mod services {
    pub mod checkout;
    pub mod order;
}

mod dtos {
    pub(crate) mod pay;
}

/// Payment routes. Mounted behind the auth gate; every handler assumes a
/// resolved identity in the request extensions.
pub fn mount_pay() -> actix_web::Scope {
    web::scope("/pay")
        .service(routes::pay::post_checkout)
        .service(routes::pay::post_payment_intent)
        .service(routes::pay::get_subscription)
        .service(routes::pay::get_orders)
}

/// Webhook intake. Mounted outside the auth gate and outside the rate
/// limiter: deliveries authenticate by signature, not by bearer token.
pub fn mount_webhook() -> actix_web::Scope {
    web::scope("/webhooks").service(routes::webhook::post_stripe_webhook)
}
