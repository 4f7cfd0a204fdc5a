//! Engine assembly.
//!
//! [`AuthEngine`] wires configuration, stores, the signer and the audit sink
//! into the components and exposes each lifecycle operation.

use std::sync::Arc;

use time::Duration;
use uuid::Uuid;

use crate::AuthResult;
use crate::audit::{AuditDispatcher, AuditSink};
use crate::config::KeygateConfig;
use crate::context::RequestContext;
use crate::credential::{CredentialHasher, DeviceBinder};
use crate::error::AuthError;
use crate::oauth::code::{AuthorizationCodeManager, IssueCodeRequest};
use crate::oauth::response::TokenResponse;
use crate::permission::{PermissionResolver, ResolvedPermissions};
use crate::storage::AuthStores;
use crate::token::claims::AccessTokenClaims;
use crate::token::issuer::{ExchangeCodeRequest, TokenIssuer};
use crate::token::jwt::{AccessTokenSigner, JwtSigner};
use crate::token::minter::TokenMinter;
use crate::token::revocation::{RevocationService, RevocationSummary};
use crate::token::rotation::RefreshRotator;
use crate::types::User;

/// The assembled token lifecycle engine.
pub struct AuthEngine {
    codes: Arc<AuthorizationCodeManager>,
    issuer: TokenIssuer,
    rotator: RefreshRotator,
    revocation: RevocationService,
    resolver: Arc<PermissionResolver>,
    audit: AuditDispatcher,
}

impl AuthEngine {
    /// Builds the engine. Must be called within a Tokio runtime, which runs
    /// the audit worker.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the configuration does not validate.
    pub fn new(
        config: &KeygateConfig,
        stores: AuthStores,
        signer: Arc<dyn AccessTokenSigner>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> AuthResult<Self> {
        config.validate()?;

        let (audit, _worker) = AuditDispatcher::spawn(audit_sink, config.audit.channel_capacity);
        let hasher = Arc::new(CredentialHasher::new(&config.credentials.code_hash_key)?);
        let binder = Arc::new(DeviceBinder::new(
            &config.credentials.binding_salt,
            config.binding.clone(),
        ));
        let resolver = Arc::new(PermissionResolver::new(
            stores.users.clone(),
            stores.roles.clone(),
        ));
        let minter = Arc::new(TokenMinter::new(
            signer,
            resolver.clone(),
            hasher.clone(),
            binder.clone(),
            config.issuer.clone(),
            lifetime("oauth.access_token_lifetime", config.oauth.access_token_lifetime)?,
            lifetime("oauth.refresh_token_lifetime", config.oauth.refresh_token_lifetime)?,
        ));

        let codes = Arc::new(AuthorizationCodeManager::new(
            stores.clients.clone(),
            stores.codes.clone(),
            hasher.clone(),
            audit.clone(),
            lifetime(
                "oauth.authorization_code_lifetime",
                config.oauth.authorization_code_lifetime,
            )?,
        ));
        let issuer = TokenIssuer::new(
            codes.clone(),
            stores.clients.clone(),
            stores.users.clone(),
            stores.refresh_tokens.clone(),
            minter.clone(),
            audit.clone(),
        );
        let rotator = RefreshRotator::new(
            stores.refresh_tokens.clone(),
            stores.users.clone(),
            hasher,
            binder,
            minter,
            audit.clone(),
        );
        let revocation = RevocationService::new(
            stores.revocations.clone(),
            stores.sessions.clone(),
            stores.refresh_tokens.clone(),
            config.revocation.clone(),
            audit.clone(),
        );

        tracing::info!(
            issuer = %config.issuer,
            ip_match = ?config.binding.ip_match,
            "Token lifecycle engine ready"
        );

        Ok(Self {
            codes,
            issuer,
            rotator,
            revocation,
            resolver,
            audit,
        })
    }

    /// Builds the engine with a [`JwtSigner`] derived from `config.signing`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for invalid configuration or key material.
    pub fn from_config(
        config: &KeygateConfig,
        stores: AuthStores,
        audit_sink: Arc<dyn AuditSink>,
    ) -> AuthResult<Self> {
        config.validate()?;
        let signer = JwtSigner::from_config(&config.signing)?;
        Self::new(config, stores, Arc::new(signer), audit_sink)
    }

    #[must_use]
    pub fn codes(&self) -> &AuthorizationCodeManager {
        &self.codes
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn rotator(&self) -> &RefreshRotator {
        &self.rotator
    }

    #[must_use]
    pub fn revocation(&self) -> &RevocationService {
        &self.revocation
    }

    #[must_use]
    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    #[must_use]
    pub fn audit(&self) -> &AuditDispatcher {
        &self.audit
    }

    /// See [`AuthorizationCodeManager::issue_code`].
    ///
    /// # Errors
    ///
    /// See [`AuthorizationCodeManager::issue_code`].
    pub async fn issue_code(
        &self,
        ctx: &RequestContext,
        request: IssueCodeRequest,
    ) -> AuthResult<String> {
        self.codes.issue_code(ctx, request).await
    }

    /// See [`TokenIssuer::exchange_code_for_tokens`].
    ///
    /// # Errors
    ///
    /// See [`TokenIssuer::exchange_code_for_tokens`].
    pub async fn exchange_code_for_tokens(
        &self,
        ctx: &RequestContext,
        request: ExchangeCodeRequest,
    ) -> AuthResult<TokenResponse> {
        self.issuer.exchange_code_for_tokens(ctx, request).await
    }

    /// See [`RefreshRotator::refresh_access_token`].
    ///
    /// # Errors
    ///
    /// See [`RefreshRotator::refresh_access_token`].
    pub async fn refresh_access_token(
        &self,
        ctx: &RequestContext,
        refresh_token: &str,
        client_id: &str,
    ) -> AuthResult<TokenResponse> {
        self.rotator
            .refresh_access_token(ctx, refresh_token, client_id)
            .await
    }

    /// See [`PermissionResolver::resolve`].
    ///
    /// # Errors
    ///
    /// See [`PermissionResolver::resolve`].
    pub async fn resolve_permissions(
        &self,
        ctx: &RequestContext,
        user: &User,
        organization_id: Option<Uuid>,
    ) -> AuthResult<ResolvedPermissions> {
        self.resolver.resolve(ctx, user, organization_id).await
    }

    /// See [`RevocationService::revoke_token`].
    ///
    /// # Errors
    ///
    /// See [`RevocationService::revoke_token`].
    pub async fn revoke_token(&self, ctx: &RequestContext, token: &str) -> AuthResult<()> {
        self.revocation.revoke_token(ctx, token).await
    }

    /// See [`RevocationService::is_token_revoked`].
    ///
    /// # Errors
    ///
    /// See [`RevocationService::is_token_revoked`].
    pub async fn is_token_revoked(&self, ctx: &RequestContext, token: &str) -> AuthResult<bool> {
        self.revocation.is_token_revoked(ctx, token).await
    }

    /// See [`RevocationService::is_access_revoked`].
    ///
    /// # Errors
    ///
    /// See [`RevocationService::is_access_revoked`].
    pub async fn is_access_revoked(
        &self,
        ctx: &RequestContext,
        claims: &AccessTokenClaims,
    ) -> AuthResult<bool> {
        self.revocation.is_access_revoked(ctx, claims).await
    }

    /// See [`RevocationService::revoke_user_sessions`].
    ///
    /// # Errors
    ///
    /// See [`RevocationService::revoke_user_sessions`].
    pub async fn revoke_user_sessions(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
    ) -> AuthResult<RevocationSummary> {
        self.revocation.revoke_user_sessions(ctx, user_id).await
    }

    /// See [`RevocationService::revoke_org_sessions`].
    ///
    /// # Errors
    ///
    /// See [`RevocationService::revoke_org_sessions`].
    pub async fn revoke_org_sessions(
        &self,
        ctx: &RequestContext,
        org_id: Uuid,
    ) -> AuthResult<RevocationSummary> {
        self.revocation.revoke_org_sessions(ctx, org_id).await
    }

    /// See [`RevocationService::revoke_user_in_org`].
    ///
    /// # Errors
    ///
    /// See [`RevocationService::revoke_user_in_org`].
    pub async fn revoke_user_in_org(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        org_id: Uuid,
    ) -> AuthResult<RevocationSummary> {
        self.revocation
            .revoke_user_in_org(ctx, user_id, org_id)
            .await
    }
}

fn lifetime(name: &str, value: std::time::Duration) -> AuthResult<Duration> {
    Duration::try_from(value)
        .map_err(|_| AuthError::configuration(format!("{name} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TracingAuditSink;
    use crate::config::test_config;
    use crate::storage::memory::InMemoryStores;

    #[tokio::test]
    async fn test_builds_from_valid_config() {
        let stores = InMemoryStores::new();
        let engine = AuthEngine::from_config(
            &test_config(),
            stores.as_auth_stores(),
            Arc::new(TracingAuditSink),
        );
        assert!(engine.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut config = test_config();
        config.credentials.code_hash_key = "short".to_string();
        let result = AuthEngine::from_config(
            &config,
            InMemoryStores::new().as_auth_stores(),
            Arc::new(TracingAuditSink),
        );
        assert!(matches!(result, Err(AuthError::Configuration { .. })));
    }

    #[test]
    fn test_lifetime_conversion() {
        assert_eq!(
            lifetime("x", std::time::Duration::from_secs(3600)).unwrap(),
            Duration::hours(1)
        );
    }
}
