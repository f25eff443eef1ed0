use std::sync::Arc;

use actix_web::web;
use middleware::auth::AuthGate;
use services::identity::IdentityProvider;

pub mod classify;

pub mod middleware {
    pub mod auth;
}

pub mod services {
    pub mod identity;
}

pub mod routes {
    pub mod auth;
}

mod dtos {
    pub(crate) mod auth;
}

/// Identity-resolution middleware. The provider is injected once at
/// startup; tests swap in a stub.
pub fn auth_gate(provider: Arc<dyn IdentityProvider>) -> AuthGate {
    AuthGate::new(provider)
}

pub fn mount_auth() -> actix_web::Scope {
    web::scope("/auth")
        .service(routes::auth::post_signup)
        .service(routes::auth::get_session)
        .service(routes::auth::post_refresh)
}
