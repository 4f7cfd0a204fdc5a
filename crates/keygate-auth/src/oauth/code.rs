//! Authorization code issuance and consumption.
//!
//! # Security
//!
//! - Codes carry 256 bits of entropy and are returned to the caller once
//! - Only the keyed hash is stored, so a store dump yields no usable codes
//! - Consumption is a single conditional update in the store; concurrent
//!   exchanges of the same code produce exactly one winner
//! - Redirect URIs are compared byte for byte

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::audit::{AuditAction, AuditDispatcher, AuditEvent};
use crate::context::RequestContext;
use crate::credential::CredentialHasher;
use crate::error::AuthError;
use crate::oauth::pkce;
use crate::storage::{AuthorizationCodeStorage, ClientStorage, CodeConsumption};
use crate::types::AuthorizationCode;

/// Parameters of an approved authorization request.
#[derive(Debug, Clone)]
pub struct IssueCodeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    /// Space-delimited requested scope.
    pub scope: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// The authenticated user who approved the request.
    pub user_id: Uuid,
    /// Organization the resulting tokens are scoped to.
    pub organization_id: Option<Uuid>,
}

/// Issues and consumes authorization codes.
///
/// This is the only component that writes [`AuthorizationCode`] records.
pub struct AuthorizationCodeManager {
    clients: Arc<dyn ClientStorage>,
    codes: Arc<dyn AuthorizationCodeStorage>,
    hasher: Arc<CredentialHasher>,
    audit: AuditDispatcher,
    lifetime: Duration,
}

impl AuthorizationCodeManager {
    #[must_use]
    pub fn new(
        clients: Arc<dyn ClientStorage>,
        codes: Arc<dyn AuthorizationCodeStorage>,
        hasher: Arc<CredentialHasher>,
        audit: AuditDispatcher,
        lifetime: Duration,
    ) -> Self {
        Self {
            clients,
            codes,
            hasher,
            audit,
            lifetime,
        }
    }

    /// Issues a code for an approved authorization request.
    ///
    /// Checks run in order: client, redirect URI, PKCE, scope. The raw code
    /// is returned exactly once and never stored.
    ///
    /// # Errors
    ///
    /// - `InvalidClient` if the client is unknown or inactive
    /// - `InvalidRedirectUri` if the URI is not registered exactly
    /// - `PkceRequired` if the challenge is missing or not `S256`
    /// - `ScopeNotAllowed` for the first scope token outside the client's allowed set
    pub async fn issue_code(
        &self,
        ctx: &RequestContext,
        request: IssueCodeRequest,
    ) -> AuthResult<String> {
        let client = ctx
            .run(self.clients.find_by_client_id(&request.client_id))
            .await?
            .filter(|c| c.active)
            .ok_or_else(|| AuthError::invalid_client("unknown client"))?;

        if !client.is_redirect_uri_allowed(&request.redirect_uri) {
            return Err(AuthError::invalid_redirect_uri(request.redirect_uri));
        }

        let (challenge, method) = pkce::require_challenge(
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        )?;

        if let Some(scope) = client.first_disallowed_scope(&request.scope) {
            return Err(AuthError::scope_not_allowed(scope));
        }

        let (raw_code, code_hash) = self.hasher.generate();
        let now = OffsetDateTime::now_utc();
        let record = AuthorizationCode {
            id: Uuid::new_v4(),
            code_hash,
            client_id: request.client_id,
            user_id: request.user_id,
            organization_id: request.organization_id,
            redirect_uri: request.redirect_uri,
            scope: request.scope,
            code_challenge: challenge.into_inner(),
            code_challenge_method: method,
            created_at: now,
            expires_at: now + self.lifetime,
            used: false,
        };
        ctx.run(self.codes.create(&record)).await?;

        tracing::debug!(
            client_id = %record.client_id,
            user_id = %record.user_id,
            org_id = ?record.organization_id,
            "Authorization code issued"
        );
        self.audit.record(
            AuditEvent::new(AuditAction::CodeIssued)
                .actor(record.user_id)
                .resource(&record.client_id)
                .detail("scope", record.scope.as_str())
                .request_id(ctx.request_id()),
        );

        Ok(raw_code)
    }

    /// Consumes a code, marking it used.
    ///
    /// The lookup and the `used` flip happen in one conditional store
    /// operation. A client or redirect URI mismatch leaves the code unused.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGrant` if the code is unknown, expired, already used
    /// or was issued for a different client or redirect URI.
    pub async fn consume_code(
        &self,
        ctx: &RequestContext,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> AuthResult<AuthorizationCode> {
        let code_hash = self.hasher.hash(code);
        let outcome = ctx
            .run(
                self.codes
                    .consume(&code_hash, client_id, redirect_uri, OffsetDateTime::now_utc()),
            )
            .await?;

        match outcome {
            CodeConsumption::Consumed(code) => Ok(code),
            other => {
                let reason = other.reason();
                tracing::debug!(client_id, reason, "Authorization code rejected");
                self.audit.record(
                    AuditEvent::new(AuditAction::CodeExchangeFailed)
                        .actor(client_id)
                        .resource(client_id)
                        .failure(reason)
                        .request_id(ctx.request_id()),
                );
                Err(AuthError::invalid_grant(reason))
            }
        }
    }

    /// Deletes expired codes. Best effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        self.codes.cleanup_expired(OffsetDateTime::now_utc()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::oauth::pkce::{PkceChallenge, PkceVerifier};
    use crate::storage::memory::InMemoryStores;
    use crate::types::ClientApp;

    const REDIRECT: &str = "https://app.example.com/cb";

    fn client() -> ClientApp {
        ClientApp {
            client_id: "c1".to_string(),
            name: "App".to_string(),
            client_secret_hash: None,
            redirect_uris: vec![REDIRECT.to_string()],
            allowed_scopes: vec!["profile".to_string(), "email".to_string()],
            is_confidential: false,
            active: true,
        }
    }

    fn manager() -> (AuthorizationCodeManager, InMemoryStores) {
        let stores = InMemoryStores::new();
        stores.clients.insert(client());
        let (audit, _) = AuditDispatcher::spawn(Arc::new(MemoryAuditSink::new()), 16);
        let hasher = CredentialHasher::new("test-code-hash-key-0123456789abcdef").unwrap();
        let manager = AuthorizationCodeManager::new(
            stores.clients.clone(),
            stores.codes.clone(),
            Arc::new(hasher),
            audit,
            Duration::minutes(10),
        );
        (manager, stores)
    }

    fn request(verifier: &PkceVerifier) -> IssueCodeRequest {
        IssueCodeRequest {
            client_id: "c1".to_string(),
            redirect_uri: REDIRECT.to_string(),
            scope: "profile".to_string(),
            code_challenge: Some(PkceChallenge::from_verifier(verifier).into_inner()),
            code_challenge_method: Some("S256".to_string()),
            user_id: Uuid::new_v4(),
            organization_id: None,
        }
    }

    #[tokio::test]
    async fn test_issue_stores_hash_only() {
        let (manager, stores) = manager();
        let ctx = RequestContext::background();
        let code = manager
            .issue_code(&ctx, request(&PkceVerifier::generate()))
            .await
            .unwrap();

        assert_eq!(stores.codes.len(), 1);
        assert!(stores.codes.get(&code).is_none());
        let stored = stores.codes.get(&manager.hasher.hash(&code)).unwrap();
        assert!(!stored.used);
        assert_eq!(stored.expires_at - stored.created_at, Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_clients_rejected() {
        let (manager, stores) = manager();
        let ctx = RequestContext::background();
        let mut req = request(&PkceVerifier::generate());
        req.client_id = "nope".to_string();
        assert!(matches!(
            manager.issue_code(&ctx, req).await,
            Err(AuthError::InvalidClient { .. })
        ));

        let mut inactive = client();
        inactive.active = false;
        stores.clients.insert(inactive);
        assert!(matches!(
            manager
                .issue_code(&ctx, request(&PkceVerifier::generate()))
                .await,
            Err(AuthError::InvalidClient { .. })
        ));
    }

    #[tokio::test]
    async fn test_redirect_uri_exact_match() {
        let (manager, _) = manager();
        let ctx = RequestContext::background();
        let mut req = request(&PkceVerifier::generate());
        req.redirect_uri = format!("{REDIRECT}/");
        assert!(matches!(
            manager.issue_code(&ctx, req).await,
            Err(AuthError::InvalidRedirectUri { .. })
        ));
    }

    #[tokio::test]
    async fn test_pkce_required() {
        let (manager, _) = manager();
        let ctx = RequestContext::background();

        let mut missing = request(&PkceVerifier::generate());
        missing.code_challenge = None;
        assert!(matches!(
            manager.issue_code(&ctx, missing).await,
            Err(AuthError::PkceRequired { .. })
        ));

        let mut plain = request(&PkceVerifier::generate());
        plain.code_challenge_method = Some("plain".to_string());
        assert!(matches!(
            manager.issue_code(&ctx, plain).await,
            Err(AuthError::PkceRequired { .. })
        ));
    }

    #[tokio::test]
    async fn test_scope_must_be_allowed() {
        let (manager, _) = manager();
        let ctx = RequestContext::background();
        let mut req = request(&PkceVerifier::generate());
        req.scope = "profile admin".to_string();
        match manager.issue_code(&ctx, req).await {
            Err(AuthError::ScopeNotAllowed { scope }) => assert_eq!(scope, "admin"),
            other => panic!("expected ScopeNotAllowed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_consume_once() {
        let (manager, _) = manager();
        let ctx = RequestContext::background();
        let code = manager
            .issue_code(&ctx, request(&PkceVerifier::generate()))
            .await
            .unwrap();

        let consumed = manager.consume_code(&ctx, &code, "c1", REDIRECT).await.unwrap();
        assert!(consumed.used);
        assert!(matches!(
            manager.consume_code(&ctx, &code, "c1", REDIRECT).await,
            Err(AuthError::InvalidGrant { .. })
        ));
    }

    #[tokio::test]
    async fn test_mismatch_does_not_burn_code() {
        let (manager, _) = manager();
        let ctx = RequestContext::background();
        let code = manager
            .issue_code(&ctx, request(&PkceVerifier::generate()))
            .await
            .unwrap();

        assert!(
            manager
                .consume_code(&ctx, &code, "other", REDIRECT)
                .await
                .is_err()
        );
        assert!(
            manager
                .consume_code(&ctx, &code, "c1", "https://evil.example.com/cb")
                .await
                .is_err()
        );
        assert!(manager.consume_code(&ctx, &code, "c1", REDIRECT).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_code_rejected() {
        let (manager, _) = manager();
        let ctx = RequestContext::background();
        assert!(matches!(
            manager.consume_code(&ctx, "bogus", "c1", REDIRECT).await,
            Err(AuthError::InvalidGrant { .. })
        ));
    }
}
