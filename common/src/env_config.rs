use std::{env, sync::Arc};

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// Holds everything needed to initialize and run the API: database
/// connection, server binding, CORS, logging, the external identity
/// service, and the Stripe keys used by the payment routes and the
/// webhook processor.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// Base URL of the external identity service that verifies bearer tokens.
    pub identity_service_url: String,
    /// Service key sent alongside every identity-service call.
    pub identity_service_key: String,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Where checkout redirects on success / cancellation.
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    /// Stripe price ids for the two paid tiers.
    pub price_id_supporter: String,
    pub price_id_vip: String,
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// Required:
    /// - `ENVIRONMENT`: "development" or "production"
    /// - `DATABASE_URL`: Connection string for the database
    /// - `IDENTITY_SERVICE_URL`: Base URL of the identity provider
    ///
    /// Optional (with defaults): `IP`, `PORT`, `WORKERS`,
    /// `CORS_ALLOWED_ORIGIN`, `ENABLE_CONSOLE_LOGGING`, checkout redirect
    /// URLs. The Stripe keys default to empty strings so the server can
    /// boot without payments configured (the webhook endpoint then rejects
    /// everything, which is the safe direction).
    ///
    /// # Panics
    ///
    /// Panics if a required variable is missing or a numeric value cannot
    /// be parsed.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            num_workers: env::var("WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            identity_service_url: env::var("IDENTITY_SERVICE_URL")
                .expect("IDENTITY_SERVICE_URL must be set"),
            identity_service_key: env::var("IDENTITY_SERVICE_KEY").unwrap_or_default(),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            checkout_success_url: env::var("CHECKOUT_SUCCESS_URL").unwrap_or_else(|_| {
                "http://localhost:3000/dashboard?session_id={CHECKOUT_SESSION_ID}".to_string()
            }),
            checkout_cancel_url: env::var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| "http://localhost:3000/pricing".to_string()),
            price_id_supporter: env::var("STRIPE_PRICE_ID_SUPPORTER").unwrap_or_default(),
            price_id_vip: env::var("STRIPE_PRICE_ID_VIP").unwrap_or_default(),
        })
    }
}
