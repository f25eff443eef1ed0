use actix_web::HttpResponse;
use serde_json::json;
use thiserror::Error;

pub type Res<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    // === CONVERSION ERRORS ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stripe error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("Identity service error: {0}")]
    Reqwest(#[from] reqwest::Error),

    // === APPLICATION ERRORS ===
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("You do not have permission to perform this action: {0}")]
    Forbidden(String),

    #[error("{message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Too many requests: {0}")]
    RateLimitExceeded(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid_input(message: impl Into<String>, field: impl Into<String>) -> Self {
        AppError::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Stable machine-readable code carried in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Stripe(_) | AppError::ExternalApi(_) => "EXTERNAL_API_ERROR",
            AppError::Reqwest(_) | AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::InvalidToken(_) => "INVALID_TOKEN",
            AppError::InvalidSignature(_) => "INVALID_SIGNATURE",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::InvalidInput { .. } => "INVALID_INPUT",
            AppError::MissingField(_) => "MISSING_FIELD",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AlreadyExists(_) => "ALREADY_EXISTS",
            AppError::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
        }
    }

    fn envelope(&self, message: &str) -> serde_json::Value {
        let mut error = json!({
            "code": self.code(),
            "message": message,
        });
        if let AppError::InvalidInput {
            field: Some(field), ..
        } = self
        {
            error["field"] = json!(field);
        }
        json!({ "error": error })
    }

    pub fn to_http_response(&self) -> HttpResponse {
        let is_dev = cfg!(debug_assertions);

        // 500-family messages are masked outside debug builds so provider
        // or database internals never reach the client.
        let internal_message = |err_msg: &str| {
            if is_dev {
                err_msg.to_string()
            } else {
                "Internal server error".to_string()
            }
        };

        match self {
            // === CONVERSION ERRORS ===
            AppError::Database(error) => {
                if is_unique_violation(error) {
                    let conflict = AppError::AlreadyExists("resource".to_string());
                    return HttpResponse::Conflict()
                        .json(conflict.envelope("Resource already exists"));
                }
                log::error!("Database error: {}", error);
                HttpResponse::InternalServerError()
                    .json(self.envelope(&internal_message(&error.to_string())))
            }
            AppError::Stripe(error) => {
                log::error!("Stripe error: {}", error);
                HttpResponse::InternalServerError()
                    .json(self.envelope(&internal_message(&error.to_string())))
            }
            AppError::Reqwest(error) => {
                log::error!("Identity service error: {}", error);
                HttpResponse::InternalServerError()
                    .json(self.envelope(&internal_message(&error.to_string())))
            }

            // === APPLICATION ERRORS ===
            AppError::Unauthorized(_) | AppError::InvalidToken(_) => {
                HttpResponse::Unauthorized().json(self.envelope(&self.to_string()))
            }
            AppError::InvalidSignature(_) => {
                HttpResponse::BadRequest().json(self.envelope(&self.to_string()))
            }
            AppError::Forbidden(_) => {
                HttpResponse::Forbidden().json(self.envelope(&self.to_string()))
            }
            AppError::InvalidInput { .. } | AppError::MissingField(_) => {
                HttpResponse::BadRequest().json(self.envelope(&self.to_string()))
            }
            AppError::NotFound(_) => {
                HttpResponse::NotFound().json(self.envelope(&self.to_string()))
            }
            AppError::AlreadyExists(_) => {
                HttpResponse::Conflict().json(self.envelope(&self.to_string()))
            }
            AppError::RateLimitExceeded(_) => {
                HttpResponse::TooManyRequests().json(self.envelope(&self.to_string()))
            }
            AppError::ExternalApi(error) => {
                log::error!("External API error: {}", error);
                HttpResponse::InternalServerError()
                    .json(self.envelope(&internal_message(error)))
            }
            AppError::Internal(error) => {
                log::error!("Internal error: {}", error);
                HttpResponse::InternalServerError()
                    .json(self.envelope(&internal_message(error)))
            }
        }
    }
}

/// Postgres unique-constraint collision (SQLSTATE 23505), surfaced as a 409
/// instead of a masked 500.
fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

impl actix_web::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        self.to_http_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    fn status_of(err: &AppError) -> StatusCode {
        err.to_http_response().status()
    }

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        assert_eq!(
            status_of(&AppError::Unauthorized("no token".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(&AppError::InvalidToken("expired".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(&AppError::InvalidSignature("mismatch".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(&AppError::Forbidden("not the author".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(&AppError::MissingField("tier".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(&AppError::NotFound("order".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(&AppError::AlreadyExists("subscription".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(&AppError::RateLimitExceeded("slow down".into())),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(&AppError::ExternalApi("provider down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelope_carries_code_message_and_optional_field() {
        let err = AppError::invalid_input("tier must be supporter or vip", "tier");
        let body = err.envelope(&err.to_string());
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
        assert_eq!(body["error"]["field"], "tier");
        assert_eq!(body["error"]["message"], "tier must be supporter or vip");

        let err = AppError::NotFound("item".into());
        let body = err.envelope(&err.to_string());
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert!(body["error"].get("field").is_none());
    }
}
