use thiserror::Error;

/// Failures of authenticated API requests
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - session may have expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Why a login attempt failed. Reported to the caller, never retried.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Invalid email or password")]
    InvalidCredentials(Option<String>),

    #[error("Unable to reach the server: {0}")]
    NetworkFailure(String),

    #[error("Server error: {0}")]
    ServerError(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }
}

/// Pull a `message` (or `error`) string out of a JSON error body
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

impl ApiError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether the server rejected the credential itself
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl LoginError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            400 | 401 | 403 | 404 | 422 => LoginError::InvalidCredentials(server_message(body)),
            _ => LoginError::ServerError(format!("Status {}: {}", status, truncate_body(body))),
        }
    }

    /// Message suitable for showing in a login form
    pub fn user_message(&self) -> String {
        match self {
            LoginError::InvalidCredentials(Some(message)) => message.clone(),
            LoginError::InvalidCredentials(None) => "Invalid email or password".to_string(),
            LoginError::NetworkFailure(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            LoginError::ServerError(_) => "Login failed due to a server error. Please try again.".to_string(),
        }
    }
}

impl From<reqwest::Error> for LoginError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LoginError::ServerError(format!("Unreadable login response: {}", e))
        } else if let Some(status) = e.status() {
            LoginError::from_status(status, "")
        } else {
            LoginError::NetworkFailure(e.to_string())
        }
    }
}
