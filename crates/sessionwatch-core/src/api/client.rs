//! HTTP client for the authentication service.
//!
//! `ApiClient` performs the login exchange (`POST /auth/login`) and, once a
//! credential is attached with `with_token`, authenticated requests such as
//! the profile lookup (`GET /auth/me`).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{Credential, User};

use super::{ApiError, LoginError};

// ============================================================================
// Constants
// ============================================================================

/// Login endpoint, relative to the base URL
const LOGIN_PATH: &str = "/auth/login";

/// Current-user endpoint, relative to the base URL
const PROFILE_PATH: &str = "/auth/me";

/// Default HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// What a successful authentication hands back
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub user: User,
    pub credential: Credential,
}

/// Exchanges an email and secret for a user and credential.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, email: &str, secret: &str) -> Result<AuthGrant, LoginError>;
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default, alias = "credential")]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    user: User,
}

/// Interpret a 2xx login response body
fn parse_login_response(body: &str) -> Result<AuthGrant, LoginError> {
    let response: LoginResponse = serde_json::from_str(body)
        .map_err(|e| LoginError::ServerError(format!("Unreadable login response: {}", e)))?;

    if response.success == Some(false) {
        return Err(LoginError::InvalidCredentials(response.message));
    }

    match (response.user, response.token) {
        (Some(user), Some(token)) if !token.is_empty() => Ok(AuthGrant {
            user,
            credential: Credential::new(token),
        }),
        _ => Err(LoginError::ServerError(
            "Login response is missing the user or token".to_string(),
        )),
    }
}

/// API client for the authentication service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<Credential>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a new ApiClient with the given credential, sharing the connection pool.
    pub fn with_token(&self, credential: &Credential) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            token: Some(credential.clone()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|_| ApiError::InvalidResponse("Credential is not a valid header value".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Fetch the signed-in user's current record
    pub async fn fetch_profile(&self) -> Result<User, ApiError> {
        let url = self.url(PROFILE_PATH);
        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let body = response.text().await?;
        let profile: ProfileResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Unreadable profile: {}", e)))?;

        debug!(user_id = %profile.user.id, "Fetched profile");
        Ok(profile.user)
    }
}

#[async_trait]
impl Authenticator for ApiClient {
    async fn authenticate(&self, email: &str, secret: &str) -> Result<AuthGrant, LoginError> {
        let url = self.url(LOGIN_PATH);
        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest {
                email,
                password: secret,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(%status, "Authentication rejected");
            return Err(LoginError::from_status(status, &body));
        }

        parse_login_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response_success() {
        let body = r#"{"success": true, "user": {"id": 5, "email": "a@b.c", "role": "admin"}, "token": "h.p.s"}"#;
        let grant = parse_login_response(body).expect("grant");
        assert_eq!(grant.user.id.as_str(), "5");
        assert_eq!(grant.credential, Credential::new("h.p.s"));
    }

    #[test]
    fn test_parse_login_response_accepts_credential_field() {
        let body = r#"{"user": {"id": "u1"}, "credential": "h.p.s"}"#;
        let grant = parse_login_response(body).expect("grant");
        assert_eq!(grant.credential.as_str(), "h.p.s");
    }

    #[test]
    fn test_parse_login_response_unsuccessful() {
        let body = r#"{"success": false, "message": "Account locked"}"#;
        assert!(matches!(
            parse_login_response(body),
            Err(LoginError::InvalidCredentials(Some(m))) if m == "Account locked"
        ));
    }

    #[test]
    fn test_parse_login_response_incomplete_or_garbled() {
        assert!(matches!(
            parse_login_response(r#"{"success": true, "user": {"id": 1}}"#),
            Err(LoginError::ServerError(_))
        ));
        assert!(matches!(
            parse_login_response(r#"{"success": true, "user": {"id": 1}, "token": ""}"#),
            Err(LoginError::ServerError(_))
        ));
        assert!(matches!(
            parse_login_response("<html>"),
            Err(LoginError::ServerError(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("https://example.test/api/", Duration::from_secs(5))
            .expect("client");
        assert_eq!(client.base_url(), "https://example.test/api");
        assert_eq!(client.url(LOGIN_PATH), "https://example.test/api/auth/login");
    }

    #[test]
    fn test_with_token_sets_bearer_header() {
        let client = ApiClient::new("https://example.test", Duration::from_secs(5))
            .expect("client");
        assert!(client.auth_headers().expect("headers").is_empty());

        let authed = client.with_token(&Credential::new("h.p.s"));
        let headers = authed.auth_headers().expect("headers");
        assert_eq!(
            headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer h.p.s")
        );
    }
}
