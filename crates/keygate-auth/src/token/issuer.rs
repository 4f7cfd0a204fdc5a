//! Authorization code exchange.
//!
//! # Flow
//!
//! 1. Consume the code (single use, bound to client and redirect URI)
//! 2. Verify the PKCE verifier against the stored S256 challenge
//! 3. Authenticate the client; confidential clients must present their secret
//! 4. Load the user, resolve permissions and sign the access token
//! 5. Start a new refresh token family bound to the caller's device
//!
//! The code is burnt at step 1 even if a later step fails.

use std::sync::Arc;

use crate::AuthResult;
use crate::audit::{AuditAction, AuditDispatcher, AuditEvent};
use crate::context::RequestContext;
use crate::credential::verify_client_secret;
use crate::error::AuthError;
use crate::oauth::code::AuthorizationCodeManager;
use crate::oauth::pkce;
use crate::oauth::response::TokenResponse;
use crate::storage::{ClientStorage, RefreshTokenStorage, UserStorage};
use crate::token::minter::TokenMinter;
use crate::types::{AuthorizationCode, ClientApp};

/// Parameters of an `authorization_code` grant.
#[derive(Clone)]
pub struct ExchangeCodeRequest {
    pub code: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub code_verifier: String,
}

impl std::fmt::Debug for ExchangeCodeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeCodeRequest")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// Exchanges authorization codes for the first token pair of a grant.
pub struct TokenIssuer {
    codes: Arc<AuthorizationCodeManager>,
    clients: Arc<dyn ClientStorage>,
    users: Arc<dyn UserStorage>,
    refresh_tokens: Arc<dyn RefreshTokenStorage>,
    minter: Arc<TokenMinter>,
    audit: AuditDispatcher,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(
        codes: Arc<AuthorizationCodeManager>,
        clients: Arc<dyn ClientStorage>,
        users: Arc<dyn UserStorage>,
        refresh_tokens: Arc<dyn RefreshTokenStorage>,
        minter: Arc<TokenMinter>,
        audit: AuditDispatcher,
    ) -> Self {
        Self {
            codes,
            clients,
            users,
            refresh_tokens,
            minter,
            audit,
        }
    }

    /// Exchanges a code for an access token and a new refresh token family.
    ///
    /// # Errors
    ///
    /// - `InvalidGrant` for an unusable code, a PKCE mismatch or a user
    ///   without standing
    /// - `InvalidClient` for an unknown client or a bad secret
    pub async fn exchange_code_for_tokens(
        &self,
        ctx: &RequestContext,
        request: ExchangeCodeRequest,
    ) -> AuthResult<TokenResponse> {
        let code = self
            .codes
            .consume_code(ctx, &request.code, &request.client_id, &request.redirect_uri)
            .await?;

        let result = self.issue_for_code(ctx, &code, &request).await;
        match &result {
            Ok(_) => {
                tracing::debug!(
                    client_id = %code.client_id,
                    user_id = %code.user_id,
                    org_id = ?code.organization_id,
                    "Authorization code exchanged"
                );
                self.audit.record(
                    AuditEvent::new(AuditAction::CodeExchanged)
                        .actor(code.user_id)
                        .resource(&code.client_id)
                        .request_id(ctx.request_id()),
                );
            }
            Err(e) if !e.is_cancellation() => {
                tracing::debug!(client_id = %code.client_id, error = %e, "Code exchange failed");
                self.audit.record(
                    AuditEvent::new(AuditAction::CodeExchangeFailed)
                        .actor(code.user_id)
                        .resource(&code.client_id)
                        .failure(e)
                        .request_id(ctx.request_id()),
                );
            }
            Err(_) => {}
        }
        result
    }

    async fn issue_for_code(
        &self,
        ctx: &RequestContext,
        code: &AuthorizationCode,
        request: &ExchangeCodeRequest,
    ) -> AuthResult<TokenResponse> {
        pkce::verify(
            &request.code_verifier,
            &code.code_challenge,
            code.code_challenge_method.as_str(),
        )
        .map_err(|e| AuthError::invalid_grant(format!("PKCE verification failed: {e}")))?;

        let client = ctx
            .run(self.clients.find_by_client_id(&request.client_id))
            .await?
            .filter(|c| c.active)
            .ok_or_else(|| AuthError::invalid_client("unknown client"))?;
        authenticate_client(&client, request.client_secret.as_deref())?;

        let user = ctx
            .run(self.users.get_user(code.user_id))
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| AuthError::invalid_grant("user not found or inactive"))?;

        let access = self
            .minter
            .mint_access(ctx, &user, &code.client_id, code.organization_id, &code.scope)
            .await?;

        let refresh = self.minter.mint_refresh(
            ctx,
            &code.client_id,
            user.id,
            code.organization_id,
            &code.scope,
        );
        ctx.run(self.refresh_tokens.create(&refresh.record)).await?;
        tracing::debug!(
            family_id = %refresh.record.family_id,
            client_id = %code.client_id,
            "Refresh token family started"
        );

        Ok(TokenResponse::new(
            access.token,
            self.minter.expires_in(),
            refresh.raw,
            code.scope.clone(),
        ))
    }
}

/// Checks the presented secret of a confidential client.
///
/// Public clients are not authenticated here; PKCE binds their codes.
fn authenticate_client(client: &ClientApp, presented: Option<&str>) -> AuthResult<()> {
    if !client.is_confidential {
        return Ok(());
    }
    let Some(secret) = presented.filter(|s| !s.is_empty()) else {
        return Err(AuthError::invalid_client("client secret required"));
    };
    let Some(hash) = client.client_secret_hash.as_deref() else {
        return Err(AuthError::internal(format!(
            "confidential client {} has no secret hash",
            client.client_id
        )));
    };
    match verify_client_secret(secret, hash) {
        Ok(true) => Ok(()),
        Ok(false) => Err(AuthError::invalid_client("invalid client secret")),
        Err(e) => {
            tracing::error!(client_id = %client.client_id, error = %e, "Stored client secret hash is malformed");
            Err(AuthError::invalid_client("invalid client secret"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::hash_client_secret;

    fn confidential(hash: Option<String>) -> ClientApp {
        ClientApp {
            client_id: "c1".to_string(),
            name: "App".to_string(),
            client_secret_hash: hash,
            redirect_uris: vec!["https://app/cb".to_string()],
            allowed_scopes: vec!["profile".to_string()],
            is_confidential: true,
            active: true,
        }
    }

    #[test]
    fn test_confidential_client_secret() {
        let client = confidential(Some(hash_client_secret("s3cret").unwrap()));
        assert!(authenticate_client(&client, Some("s3cret")).is_ok());
        assert!(matches!(
            authenticate_client(&client, Some("wrong")),
            Err(AuthError::InvalidClient { .. })
        ));
        assert!(matches!(
            authenticate_client(&client, None),
            Err(AuthError::InvalidClient { .. })
        ));
    }

    #[test]
    fn test_public_client_skips_secret() {
        let mut client = confidential(None);
        client.is_confidential = false;
        assert!(authenticate_client(&client, None).is_ok());
    }

    #[test]
    fn test_missing_hash_is_internal() {
        let client = confidential(None);
        assert!(matches!(
            authenticate_client(&client, Some("s3cret")),
            Err(AuthError::Internal { .. })
        ));
    }

    #[test]
    fn test_request_debug_redacts_secret() {
        let request = ExchangeCodeRequest {
            code: "raw-code".to_string(),
            client_id: "c1".to_string(),
            client_secret: Some("s3cret".to_string()),
            redirect_uri: "https://app/cb".to_string(),
            code_verifier: "verifier".to_string(),
        };
        let debug = format!("{request:?}");
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("raw-code"));
    }
}
