use async_trait::async_trait;
use common::{
    error::{AppError, Res},
    identity::Identity,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Why verification failed. The split matters to clients: a rejected token
/// means re-authenticate, an unavailable provider means retry.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("token rejected: {0}")]
    Rejected(String),
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<Identity, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: Uuid,
    email: Option<String>,
}

/// HTTP client for the external identity service. Verification hits the
/// service's user endpoint with the caller's bearer token; signup and
/// session refresh are plain pass-throughs.
pub struct HttpIdentity {
    client: Client,
    base_url: String,
    service_key: String,
}

impl HttpIdentity {
    pub fn new(base_url: String, service_key: String) -> Self {
        HttpIdentity {
            client: Client::new(),
            base_url,
            service_key,
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Res<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header("apikey", &self.service_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        let body = response.json::<serde_json::Value>().await?;
        if status.is_success() {
            return Ok(body);
        }

        let message = body["msg"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .unwrap_or("Signup failed")
            .to_string();
        log::warn!("Signup rejected by identity service: {}", message);
        if status == StatusCode::UNPROCESSABLE_ENTITY || status == StatusCode::BAD_REQUEST {
            Err(AppError::InvalidInput {
                message,
                field: None,
            })
        } else if status == StatusCode::CONFLICT {
            Err(AppError::AlreadyExists("user".to_string()))
        } else {
            Err(AppError::ExternalApi(message))
        }
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> Res<serde_json::Value> {
        let response = self
            .client
            .post(format!(
                "{}/auth/v1/token?grant_type=refresh_token",
                self.base_url
            ))
            .header("apikey", &self.service_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        let body = response.json::<serde_json::Value>().await?;
        if status.is_success() {
            Ok(body)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            Err(AppError::InvalidToken(
                "refresh token rejected".to_string(),
            ))
        } else {
            Err(AppError::ExternalApi(format!(
                "session refresh failed with status {}",
                status
            )))
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentity {
    async fn verify_token(&self, token: &str) -> Result<Identity, IdentityError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(IdentityError::Rejected(format!(
                "provider returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(IdentityError::Unavailable(format!(
                "provider returned {}",
                status
            )));
        }

        // a 200 with an unparseable or id-less body is still a rejection:
        // the provider did answer, it just resolved no identity
        let user = response
            .json::<ProviderUser>()
            .await
            .map_err(|e| IdentityError::Rejected(format!("no identity in response: {}", e)))?;

        Ok(Identity {
            user_id: user.id,
            email: user.email.unwrap_or_default(),
        })
    }
}
