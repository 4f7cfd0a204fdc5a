//! End-to-end authorization code flow.

mod common;

use common::{CLIENT_ID, Harness, ctx};
use keygate_auth::audit::AuditAction;
use keygate_auth::prelude::*;
use std::time::Duration;

#[tokio::test]
async fn test_code_flow_issues_tokens_once() {
    let h = Harness::new();
    let (code, verifier) = h.issue_code_for(h.user.id, None).await;

    let response = h
        .engine
        .exchange_code_for_tokens(&ctx(), h.exchange_request(&code, &verifier))
        .await
        .expect("first exchange succeeds");

    assert_eq!(response.token_type, "Bearer");
    assert_eq!(response.expires_in, 3600);
    assert_eq!(response.scope, "profile");
    assert!(!response.refresh_token.is_empty());

    let claims = h.signer.verify(&response.access_token).unwrap();
    assert_eq!(claims.sub, h.user.id.to_string());
    assert_eq!(claims.client_id, CLIENT_ID);
    assert_eq!(claims.aud, CLIENT_ID);
    assert_eq!(claims.iss, format!("https://id.example.com/{CLIENT_ID}"));
    assert_eq!(claims.exp - claims.iat, 3600);
    assert!(claims.roles.is_empty());
    assert!(claims.org_id.is_none());

    let record = h.refresh_record(&response.refresh_token).await;
    assert_eq!(record.user_id, h.user.id);
    assert!(record.used_at.is_none());

    let second = h
        .engine
        .exchange_code_for_tokens(&ctx(), h.exchange_request(&code, &verifier))
        .await;
    let err = second.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
    assert_eq!(err.oauth_error_code(), "invalid_grant");

    assert!(
        h.audit
            .wait_for(AuditAction::CodeExchanged, Duration::from_secs(1))
            .await
            .is_some()
    );
    assert!(
        h.audit
            .wait_for(AuditAction::CodeExchangeFailed, Duration::from_secs(1))
            .await
            .is_some()
    );
}

#[tokio::test]
async fn test_wrong_client_secret_is_invalid_client() {
    let h = Harness::new();
    let (code, verifier) = h.issue_code_for(h.user.id, None).await;
    let mut request = h.exchange_request(&code, &verifier);
    request.client_secret = Some("wrong".to_string());

    let err = h
        .engine
        .exchange_code_for_tokens(&ctx(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidClient { .. }));
}

#[tokio::test]
async fn test_wrong_verifier_burns_code() {
    let h = Harness::new();
    let (code, verifier) = h.issue_code_for(h.user.id, None).await;
    let mut request = h.exchange_request(&code, &verifier);
    request.code_verifier = keygate_auth::oauth::PkceVerifier::generate()
        .as_str()
        .to_string();

    let err = h
        .engine
        .exchange_code_for_tokens(&ctx(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));

    let retry = h
        .engine
        .exchange_code_for_tokens(&ctx(), h.exchange_request(&code, &verifier))
        .await;
    assert!(matches!(retry, Err(AuthError::InvalidGrant { .. })));
}

#[tokio::test]
async fn test_refresh_after_exchange() {
    let h = Harness::new();
    let first = h.login(None).await;

    let second = h
        .engine
        .refresh_access_token(&ctx(), &first.refresh_token, CLIENT_ID)
        .await
        .unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_ne!(second.access_token, first.access_token);

    let old = h.refresh_record(&first.refresh_token).await;
    let new = h.refresh_record(&second.refresh_token).await;
    assert_eq!(old.family_id, new.family_id);
    assert_eq!(old.replaced_by, Some(new.id));
}

#[tokio::test]
async fn test_error_response_mapping() {
    let h = Harness::new();
    let err = h
        .engine
        .refresh_access_token(&ctx(), "not-a-token", CLIENT_ID)
        .await
        .unwrap_err();
    let body = TokenErrorResponse::from_error(&err);
    assert_eq!(body.error, "invalid_grant");
    assert_eq!(body.http_status(), 400);
}
