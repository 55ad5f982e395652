//! Bearer token authentication.
//!
//! Tokens are validated by asking the identity provider who they belong to.
//! In demo mode any token starting with `demo` maps to a fixed demo account.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const DEMO_USER_ID: &str = "demo_user";
pub const DEMO_USER_EMAIL: &str = "demo@masterpost.io";
const DEMO_TOKEN_PREFIX: &str = "demo";

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub is_demo: bool,
}

impl AuthUser {
    pub fn demo() -> Self {
        Self {
            uid: DEMO_USER_ID.to_string(),
            email: Some(DEMO_USER_EMAIL.to_string()),
            is_demo: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Validates bearer tokens.
pub struct AuthService {
    http: Client,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("mpost-api/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn demo_mode(&self) -> bool {
        self.config.demo_mode
    }

    /// Resolve a token to its user.
    pub async fn verify(&self, token: &str) -> ApiResult<AuthUser> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ApiError::unauthorized("Missing token"));
        }

        if self.config.demo_mode && token.starts_with(DEMO_TOKEN_PREFIX) {
            debug!("Demo token accepted");
            return Ok(AuthUser::demo());
        }

        let (Some(url), Some(anon_key)) = (&self.config.supabase_url, &self.config.anon_key)
        else {
            return Err(ApiError::unauthorized("Token validation is not configured"));
        };

        let response = self
            .http
            .get(format!("{}/auth/v1/user", url))
            .header("apikey", anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::upstream(format!("Auth service unreachable: {}", e)))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ApiError::unauthorized("Invalid or expired token"));
            }
            s => {
                warn!(status = %s, "Auth service returned an error");
                return Err(ApiError::upstream(format!("Auth service returned {}", s)));
            }
        }

        let user: ProviderUser = response
            .json()
            .await
            .map_err(|e| ApiError::upstream(format!("Invalid auth response: {}", e)))?;

        Ok(AuthUser {
            uid: user.id,
            email: user.email,
            is_demo: false,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::unauthorized("Missing or malformed bearer token"))?;

        state.auth.verify(bearer.token()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(url: Option<String>, demo_mode: bool) -> AuthService {
        AuthService::new(AuthConfig {
            supabase_url: url,
            anon_key: Some("anon".to_string()),
            demo_mode,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_demo_token() {
        let user = service(None, true).verify("demo-anything").await.unwrap();
        assert_eq!(user, AuthUser::demo());
        assert_eq!(user.uid, "demo_user");
    }

    #[tokio::test]
    async fn test_demo_token_rejected_outside_demo_mode() {
        let err = service(None, false).verify("demo-anything").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_provider_validation() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "0b6c-user",
                "email": "seller@example.com"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer expired"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let auth = service(Some(server.uri()), false);
        let user = auth.verify("good").await.unwrap();
        assert_eq!(user.uid, "0b6c-user");
        assert_eq!(user.email.as_deref(), Some("seller@example.com"));
        assert!(!user.is_demo);

        let err = auth.verify("expired").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
