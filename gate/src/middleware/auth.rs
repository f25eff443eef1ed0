use std::{future::Future, pin::Pin, rc::Rc, sync::Arc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue},
};
use common::{
    error::AppError,
    identity::{Identity, USER_EMAIL_HEADER, USER_ID_HEADER},
};
use futures::future::{Ready, ok};

use crate::{
    classify::{RouteClass, classify},
    services::identity::{IdentityError, IdentityProvider},
};

/// Resolves bearer tokens to identities on protected paths. Identity only:
/// ownership and role checks stay in the handlers.
pub struct AuthGate {
    provider: Arc<dyn IdentityProvider>,
}

impl AuthGate {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        AuthGate { provider }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = AuthGateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthGateService {
            service: Rc::new(service),
            provider: self.provider.clone(),
        })
    }
}

pub struct AuthGateService<S> {
    service: Rc<S>,
    provider: Arc<dyn IdentityProvider>,
}

impl<S, B> Service<ServiceRequest> for AuthGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let path = req.path().to_string();

        // public and unclassified paths pass through unchanged
        if classify(&path) != RouteClass::Protected {
            let srv = Rc::clone(&self.service);
            return Box::pin(async move {
                srv.call(req).await.map(|res| res.map_into_boxed_body())
            });
        }

        let token = req
            .headers()
            .get("Authorization")
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::to_owned);

        let srv = Rc::clone(&self.service);
        let provider = self.provider.clone();

        Box::pin(async move {
            let Some(token) = token else {
                // no credential at all: fail before any provider call
                log::warn!("Unauthorized request - missing token: {}", path);
                let response = AppError::Unauthorized(
                    "No authorization token provided".to_string(),
                )
                .to_http_response();
                return Ok(req.into_response(response));
            };

            match provider.verify_token(&token).await {
                Ok(identity) => {
                    if let Ok(value) = HeaderValue::from_str(&identity.user_id.to_string()) {
                        req.headers_mut()
                            .insert(HeaderName::from_static(USER_ID_HEADER), value);
                    }
                    if let Ok(value) = HeaderValue::from_str(&identity.email) {
                        req.headers_mut()
                            .insert(HeaderName::from_static(USER_EMAIL_HEADER), value);
                    }
                    log::debug!("Authenticated request: {} {}", identity.user_id, path);
                    req.extensions_mut().insert(identity);
                    srv.call(req).await.map(|res| res.map_into_boxed_body())
                }
                Err(IdentityError::Rejected(reason)) => {
                    log::warn!("Invalid token on {}: {}", path, reason);
                    let response =
                        AppError::InvalidToken("Invalid or expired token".to_string())
                            .to_http_response();
                    Ok(req.into_response(response))
                }
                Err(IdentityError::Unavailable(reason)) => {
                    // provider outage is retryable and must not read as a
                    // credential problem
                    log::error!("Identity service failure on {}: {}", path, reason);
                    let response =
                        AppError::Internal("Authentication failed".to_string())
                            .to_http_response();
                    Ok(req.into_response(response))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpResponse, test, web};
    use async_trait::async_trait;
    use uuid::Uuid;

    enum Behavior {
        Accept(Identity),
        Reject,
        Outage,
    }

    struct StubProvider {
        behavior: Behavior,
    }

    #[async_trait]
    impl IdentityProvider for StubProvider {
        async fn verify_token(&self, _token: &str) -> Result<Identity, IdentityError> {
            match &self.behavior {
                Behavior::Accept(identity) => Ok(identity.clone()),
                Behavior::Reject => Err(IdentityError::Rejected("bad token".to_string())),
                Behavior::Outage => Err(IdentityError::Unavailable("timeout".to_string())),
            }
        }
    }

    macro_rules! gated_app {
        ($behavior:expr) => {
            test::init_service(
                App::new()
                    .wrap(AuthGate::new(Arc::new(StubProvider {
                        behavior: $behavior,
                    })))
                    .route(
                        "/api/v1/posts",
                        web::get().to(|identity: web::ReqData<Identity>| async move {
                            HttpResponse::Ok()
                                .json(serde_json::json!({ "user": identity.user_id }))
                        }),
                    )
                    .route(
                        "/api/health",
                        web::get().to(|| async { HttpResponse::Ok().finish() }),
                    ),
            )
        };
    }

    fn alice() -> Identity {
        Identity {
            user_id: Uuid::nil(),
            email: "alice@example.com".to_string(),
        }
    }

    #[actix_web::test]
    async fn protected_path_without_token_is_unauthorized() {
        let app = gated_app!(Behavior::Reject).await;
        let req = test::TestRequest::get().uri("/api/v1/posts").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 401);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[actix_web::test]
    async fn rejected_token_is_invalid_token_not_unauthorized() {
        let app = gated_app!(Behavior::Reject).await;
        let req = test::TestRequest::get()
            .uri("/api/v1/posts")
            .insert_header(("Authorization", "Bearer nope"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 401);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    }

    #[actix_web::test]
    async fn provider_outage_is_an_internal_error() {
        let app = gated_app!(Behavior::Outage).await;
        let req = test::TestRequest::get()
            .uri("/api/v1/posts")
            .insert_header(("Authorization", "Bearer whatever"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 500);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
    }

    #[actix_web::test]
    async fn verified_identity_reaches_the_handler() {
        let app = gated_app!(Behavior::Accept(alice())).await;
        let req = test::TestRequest::get()
            .uri("/api/v1/posts")
            .insert_header(("Authorization", "Bearer good"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 200);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["user"], Uuid::nil().to_string());
    }

    #[actix_web::test]
    async fn public_path_needs_no_token() {
        // provider would reject everything, but it is never consulted
        let app = gated_app!(Behavior::Reject).await;
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 200);
    }
}
