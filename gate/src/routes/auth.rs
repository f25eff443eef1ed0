use std::sync::Arc;

use actix_web::{HttpRequest, Responder, get, post, web};
use common::{
    error::{AppError, Res},
    http::Success,
};

use crate::{
    dtos::auth::{RefreshRequest, SignupRequest},
    services::identity::{HttpIdentity, IdentityError, IdentityProvider},
};

/// Registers a new account with the external identity service.
///
/// # Input
/// - `req`: JSON payload with `email` and `password`
///
/// # Output
/// - Success: the identity service's session object with 201 Created
/// - Error: 400 for missing/invalid fields, 409 if the email is taken
#[post("/signup")]
async fn post_signup(
    req: web::Json<SignupRequest>,
    identity: web::Data<Arc<HttpIdentity>>,
) -> Res<impl Responder> {
    if req.email.trim().is_empty() {
        return Err(AppError::MissingField("email".to_string()));
    }
    if req.password.is_empty() {
        return Err(AppError::MissingField("password".to_string()));
    }

    let session = identity.sign_up(&req.email, &req.password).await?;
    Success::created(session)
}

/// Resolves the caller's bearer token to its identity.
///
/// # Output
/// - Success: `{user_id, email}` for the presented token
/// - Error: 401 if the token is missing or rejected
#[get("/session")]
async fn get_session(
    req: HttpRequest,
    identity: web::Data<Arc<HttpIdentity>>,
) -> Res<impl Responder> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("No authorization token provided".to_string()))?;

    let resolved = identity.verify_token(token).await.map_err(|e| match e {
        IdentityError::Rejected(reason) => AppError::InvalidToken(reason),
        IdentityError::Unavailable(reason) => AppError::ExternalApi(reason),
    })?;

    Success::ok(resolved)
}

/// Exchanges a refresh token for a fresh session.
#[post("/refresh")]
async fn post_refresh(
    req: web::Json<RefreshRequest>,
    identity: web::Data<Arc<HttpIdentity>>,
) -> Res<impl Responder> {
    if req.refresh_token.is_empty() {
        return Err(AppError::MissingField("refresh_token".to_string()));
    }

    let session = identity.refresh_session(&req.refresh_token).await?;
    Success::ok(session)
}
