mod cors;

use std::{sync::Arc, time::Duration};

use actix_web::{App, HttpResponse, HttpServer, web};
use api_pay::{processor::WebhookProcessor, signature::SignatureVerifier};
use common::env_config::Config;
use db::subscription::PgSubscriptionStore;
use gate::services::identity::HttpIdentity;
use limiter::fixed_window::{FixedWindowLimiter, RateQuota};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();

    // get info
    let is_production = config.environment == "production";
    let origin = config.cors_allowed_origin.clone();

    // init logger
    if config.console_logging_enabled {
        logger::setup().expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup(&config.database_url, is_production)
        .await
        .expect("Failed to set up database");

    // payment provider client and the webhook processor it feeds
    let stripe_client = common::stripe::create_client(&config.stripe_secret_key);
    let processor = Arc::new(WebhookProcessor::new(
        Arc::new(PgSubscriptionStore::new(pool.clone())),
        SignatureVerifier::new(&config.stripe_webhook_secret),
    ));

    // external identity service behind the auth gate
    let identity = Arc::new(HttpIdentity::new(
        config.identity_service_url.clone(),
        config.identity_service_key.clone(),
    ));

    // one limiter instance shared by every tier; the sweeper only bounds
    // memory and stops with the server
    let rate_limiter = Arc::new(FixedWindowLimiter::new());
    let _sweeper = limiter::fixed_window::spawn_sweeper(&rate_limiter, Duration::from_secs(300));

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(pool.clone()))
            .app_data(web::Data::from(config_data.clone()))
            .app_data(web::Data::new(stripe_client.clone()))
            .app_data(web::Data::new(identity.clone()))
            .app_data(web::Data::from(processor.clone()))
            // the gate runs before the scope-level tier limiters so the
            // limiter can key on the resolved user id instead of the IP
            .wrap(gate::auth_gate(identity.clone())) // 3rd
            .wrap(logger::middleware()) // 2nd
            .wrap(cors::middleware(&origin)) // 1st
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(health))
                    .service(api_pay::mount_webhook())
                    .service(
                        web::scope("/v1")
                            .service(gate::mount_auth().wrap(limiter::tier_middleware(
                                rate_limiter.clone(),
                                "auth",
                                RateQuota::AUTH,
                            )))
                            .service(api_pay::mount_pay().wrap(limiter::tier_middleware(
                                rate_limiter.clone(),
                                "api",
                                RateQuota::API,
                            ))),
                    ),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
