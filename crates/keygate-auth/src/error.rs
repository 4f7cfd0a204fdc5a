//! Authorization and token lifecycle error types.
//!
//! Every operation of the engine reports failures through [`AuthError`]. The
//! OAuth 2.0 wire code for an error is available via
//! [`AuthError::oauth_error_code`], and the public description that is safe to
//! hand back to a client via [`AuthError::public_description`].

use std::fmt;

/// Errors that can occur during authorization and token operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client is not registered or its credentials are invalid.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The redirect URI is not registered for the client.
    #[error("Invalid redirect URI: {redirect_uri}")]
    InvalidRedirectUri {
        /// The rejected redirect URI.
        redirect_uri: String,
    },

    /// A requested scope is not in the client's allowed scopes.
    #[error("Scope not allowed: {scope}")]
    ScopeNotAllowed {
        /// The rejected scope token.
        scope: String,
    },

    /// The authorization request is missing an S256 code challenge.
    #[error("PKCE required: {message}")]
    PkceRequired {
        /// Description of what was missing or unsupported.
        message: String,
    },

    /// The authorization code or refresh token is invalid, expired, used or revoked.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Internal description of why the grant is invalid.
        message: String,
    },

    /// A refresh token was presented from a device or network it was not bound to.
    #[error("Binding violation: {message}")]
    BindingViolation {
        /// Which binding did not match.
        message: String,
    },

    /// The request is invalid or malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The requested grant type is not supported.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The access token is malformed or cannot be parsed.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// A rotation could not be committed; the token family has been revoked.
    #[error("Transient failure: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation completed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The engine configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred, including invalid data states.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRedirectUri` error.
    #[must_use]
    pub fn invalid_redirect_uri(redirect_uri: impl Into<String>) -> Self {
        Self::InvalidRedirectUri {
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Creates a new `ScopeNotAllowed` error.
    #[must_use]
    pub fn scope_not_allowed(scope: impl Into<String>) -> Self {
        Self::ScopeNotAllowed {
            scope: scope.into(),
        }
    }

    /// Creates a new `PkceRequired` error.
    #[must_use]
    pub fn pkce_required(message: impl Into<String>) -> Self {
        Self::PkceRequired {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `BindingViolation` error.
    #[must_use]
    pub fn binding_violation(message: impl Into<String>) -> Self {
        Self::BindingViolation {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `Transient` error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidClient { .. }
                | Self::InvalidRedirectUri { .. }
                | Self::ScopeNotAllowed { .. }
                | Self::PkceRequired { .. }
                | Self::InvalidGrant { .. }
                | Self::BindingViolation { .. }
                | Self::InvalidRequest { .. }
                | Self::UnsupportedGrantType { .. }
                | Self::InvalidToken { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. }
                | Self::Storage { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if the client, grant or bearer token failed to authenticate.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidClient { .. }
                | Self::InvalidGrant { .. }
                | Self::BindingViolation { .. }
                | Self::InvalidToken { .. }
        )
    }

    /// Returns `true` if the grant was rejected, for any reason.
    ///
    /// Binding violations are grant failures from the caller's point of view.
    #[must_use]
    pub fn is_grant_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidGrant { .. } | Self::BindingViolation { .. }
        )
    }

    /// Returns `true` if the caller's context ended the operation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidClient { .. } => ErrorCategory::Authentication,
            Self::InvalidRedirectUri { .. } => ErrorCategory::Validation,
            Self::ScopeNotAllowed { .. } => ErrorCategory::Authorization,
            Self::PkceRequired { .. } => ErrorCategory::Validation,
            Self::InvalidGrant { .. } => ErrorCategory::Authentication,
            Self::BindingViolation { .. } => ErrorCategory::Security,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::UnsupportedGrantType { .. } => ErrorCategory::Validation,
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::Transient { .. } => ErrorCategory::Security,
            Self::Cancelled | Self::DeadlineExceeded => ErrorCategory::Cancellation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidRedirectUri { .. } => "invalid_request",
            Self::ScopeNotAllowed { .. } => "invalid_scope",
            Self::PkceRequired { .. } => "invalid_request",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::BindingViolation { .. } => "invalid_grant",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::InvalidToken { .. } => "invalid_token",
            Self::Transient { .. } => "temporarily_unavailable",
            Self::Cancelled | Self::DeadlineExceeded => "temporarily_unavailable",
            Self::Storage { .. } => "server_error",
            Self::Configuration { .. } => "server_error",
            Self::Internal { .. } => "server_error",
        }
    }

    /// Returns the description that may be shown to the client.
    ///
    /// Grant failures always collapse to the same generic text so a caller
    /// cannot tell replay, expiry, revocation or binding apart. Server-side
    /// failures never expose their internal message.
    #[must_use]
    pub fn public_description(&self) -> String {
        match self {
            Self::InvalidGrant { .. } | Self::BindingViolation { .. } => {
                "invalid grant".to_string()
            }
            Self::InvalidClient { .. } => "client authentication failed".to_string(),
            Self::Transient { .. } => {
                "token could not be refreshed; sign in again".to_string()
            }
            Self::Cancelled | Self::DeadlineExceeded => "request did not complete".to_string(),
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Client or grant authentication failures.
    Authentication,
    /// Scope and permission failures.
    Authorization,
    /// Access-token parsing failures.
    Token,
    /// Request-shape failures.
    Validation,
    /// Replay, binding and rotation incidents.
    Security,
    /// Caller cancellation or deadline.
    Cancellation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
            Self::Security => write!(f, "security"),
            Self::Cancellation => write!(f, "cancellation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::invalid_client("client not found");
        assert_eq!(err.to_string(), "Invalid client: client not found");

        let err = AuthError::invalid_redirect_uri("https://a.com/cb");
        assert_eq!(err.to_string(), "Invalid redirect URI: https://a.com/cb");

        let err = AuthError::DeadlineExceeded;
        assert_eq!(err.to_string(), "Deadline exceeded");
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::invalid_grant("replay");
        assert!(err.is_client_error());
        assert!(err.is_grant_error());
        assert!(!err.is_server_error());

        let err = AuthError::binding_violation("ip mismatch");
        assert!(err.is_grant_error());
        assert!(err.is_authentication_error());
        assert!(!AuthError::scope_not_allowed("admin").is_authentication_error());

        let err = AuthError::transient("commit failed");
        assert!(err.is_server_error());
        assert!(!err.is_client_error());

        assert!(AuthError::Cancelled.is_cancellation());
        assert!(!AuthError::storage("down").is_cancellation());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::invalid_client("test").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::binding_violation("test").category(),
            ErrorCategory::Security
        );
        assert_eq!(
            AuthError::storage("test").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Security.to_string(), "security");
    }

    #[test]
    fn test_oauth_error_code() {
        assert_eq!(
            AuthError::invalid_client("test").oauth_error_code(),
            "invalid_client"
        );
        assert_eq!(
            AuthError::invalid_redirect_uri("x").oauth_error_code(),
            "invalid_request"
        );
        assert_eq!(
            AuthError::pkce_required("x").oauth_error_code(),
            "invalid_request"
        );
        assert_eq!(
            AuthError::binding_violation("x").oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(
            AuthError::unsupported_grant_type("password").oauth_error_code(),
            "unsupported_grant_type"
        );
    }

    #[test]
    fn test_grant_errors_share_public_description() {
        let replay = AuthError::invalid_grant("refresh token already used");
        let expired = AuthError::invalid_grant("authorization code expired");
        let binding = AuthError::binding_violation("user agent mismatch");

        assert_eq!(replay.public_description(), "invalid grant");
        assert_eq!(expired.public_description(), replay.public_description());
        assert_eq!(binding.public_description(), replay.public_description());
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = AuthError::storage("connection refused to 10.0.0.5:5432");
        assert!(!err.public_description().contains("10.0.0.5"));
    }
}
