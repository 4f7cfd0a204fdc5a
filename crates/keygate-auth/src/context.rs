//! Typed request context.
//!
//! Every engine operation takes a [`RequestContext`] by reference. It carries
//! the caller's device fingerprint (user agent and IP), an optional deadline
//! and a cancellation token. Storage calls are wrapped with
//! [`RequestContext::run`] so a cancelled or timed-out request drops its
//! in-flight future, which rolls back any open transaction.
//!
//! [`Principal`] is the typed view of an authenticated caller, built from
//! verified access-token claims.

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::token::claims::AccessTokenClaims;

/// Per-request context passed to every engine operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    user_agent: String,
    ip: Option<IpAddr>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Creates a context for a request from the given device.
    #[must_use]
    pub fn new(user_agent: impl Into<String>, ip: Option<IpAddr>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_agent: user_agent.into(),
            ip,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Context with no device information, for administrative calls.
    #[must_use]
    pub fn background() -> Self {
        Self::new("", None)
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Ties this context to an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Correlation id for logs and audit events.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The token that cancels this request.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns an error if the request is already cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` or `DeadlineExceeded`.
    pub fn check(&self) -> AuthResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AuthError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drives `fut` to completion unless the request is cancelled or its
    /// deadline passes first, in which case `fut` is dropped.
    ///
    /// # Errors
    ///
    /// Returns the future's own error, `Cancelled` or `DeadlineExceeded`.
    pub async fn run<F, T>(&self, fut: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        self.check()?;
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(AuthError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Err(AuthError::DeadlineExceeded),
                result = fut => result,
            },
            None => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(AuthError::Cancelled),
                result = fut => result,
            },
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

/// An authenticated caller, as described by a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub client_id: String,
    pub organization_id: Option<Uuid>,
    pub is_superadmin: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl Principal {
    /// Builds a principal from verified claims.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the subject is not a user id.
    pub fn from_claims(claims: &AccessTokenClaims) -> AuthResult<Self> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::invalid_token("subject is not a user id"))?;
        Ok(Self {
            user_id,
            client_id: claims.client_id.clone(),
            organization_id: claims.org_id,
            is_superadmin: claims.is_superadmin,
            roles: claims.roles.clone(),
            permissions: claims.permissions.clone(),
        })
    }

    /// Returns `true` if the principal holds `permission`.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Returns `true` if the principal acts within `organization_id`.
    #[must_use]
    pub fn is_in_organization(&self, organization_id: Uuid) -> bool {
        self.organization_id == Some(organization_id)
    }
}
