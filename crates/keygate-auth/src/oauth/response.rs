//! Token endpoint response bodies.

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Successful token response.
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "refresh_token": "q0VJ...",
///   "scope": "profile"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// Always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    pub refresh_token: String,

    /// Granted scope, space-delimited.
    pub scope: String,
}

impl TokenResponse {
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, refresh_token: String, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token,
            scope,
        }
    }
}

/// OAuth 2.0 error response.
///
/// Built from an [`AuthError`] so that grant failures never reveal their cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    #[must_use]
    pub fn from_error(error: &AuthError) -> Self {
        Self {
            error: error.oauth_error_code().to_string(),
            error_description: Some(error.public_description()),
        }
    }

    /// HTTP status for the error code.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.error.as_str() {
            "invalid_client" | "invalid_token" => 401,
            "temporarily_unavailable" => 503,
            "server_error" => 500,
            _ => 400,
        }
    }
}

impl From<&AuthError> for TokenErrorResponse {
    fn from(error: &AuthError) -> Self {
        Self::from_error(error)
    }
}
