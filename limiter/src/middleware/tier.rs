use std::{future::Future, pin::Pin, rc::Rc, sync::Arc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue, RETRY_AFTER},
};
use common::{error::AppError, identity::Identity};

use crate::fixed_window::{FixedWindowLimiter, RateQuota};

/// Rate-limits every request passing through a scope against one named
/// budget tier. Runs before business logic; the identifier is the
/// authenticated user id when the auth gate already resolved one, else the
/// peer IP.
pub struct TierLimiter {
    limiter: Arc<FixedWindowLimiter>,
    tier: &'static str,
    quota: RateQuota,
}

impl TierLimiter {
    pub fn new(limiter: Arc<FixedWindowLimiter>, tier: &'static str, quota: RateQuota) -> Self {
        Self {
            limiter,
            tier,
            quota,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TierLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = TierLimiterService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(TierLimiterService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            tier: self.tier,
            quota: self.quota,
        }))
    }
}

pub struct TierLimiterService<S> {
    service: Rc<S>,
    limiter: Arc<FixedWindowLimiter>,
    tier: &'static str,
    quota: RateQuota,
}

impl<S, B> Service<ServiceRequest> for TierLimiterService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let tier = self.tier;
        let quota = self.quota;

        Box::pin(async move {
            let identifier = req
                .extensions()
                .get::<Identity>()
                .map(|identity| identity.user_id.to_string())
                .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
                .unwrap_or_else(|| "unknown".to_string());
            let key = format!("{}:{}", tier, identifier);

            if limiter.allow(&key, quota) {
                return srv.call(req).await.map(|res| res.map_into_boxed_body());
            }

            let reset = limiter.reset_seconds(&key);
            log::warn!(
                "Rate limit exceeded on tier '{}' for {} (resets in {}s)",
                tier,
                identifier,
                reset
            );

            let mut response = AppError::RateLimitExceeded(format!(
                "Rate limit exceeded. Try again in {} seconds.",
                reset
            ))
            .to_http_response();
            if let Ok(value) = HeaderValue::from_str(&reset.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            response.headers_mut().insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from_static("0"),
            );

            Ok(req.into_response(response))
        })
    }
}
