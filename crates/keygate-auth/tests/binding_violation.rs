//! Device binding enforcement on refresh.

mod common;

use std::time::Duration;

use common::{CLIENT_ID, Harness, USER_AGENT, ctx, ip};
use keygate_auth::audit::AuditAction;
use keygate_auth::config::IpMatchMode;
use keygate_auth::prelude::*;
use time::OffsetDateTime;

#[tokio::test]
async fn test_foreign_device_revokes_whole_family() {
    let h = Harness::new();
    let login = h.login(None).await;
    let record = h.refresh_record(&login.refresh_token).await;

    // A second, never-used token in the same family.
    let sibling_raw = keygate_auth::credential::generate_opaque_token();
    let sibling = record.successor(
        h.refresh_hash(&sibling_raw),
        OffsetDateTime::now_utc(),
        time::Duration::days(1),
    );
    h.stores.refresh_tokens.create(&sibling).await.unwrap();

    let thief = RequestContext::new("curl/8.5.0", ip("198.51.100.9"));
    let err = h
        .engine
        .refresh_access_token(&thief, &login.refresh_token, CLIENT_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BindingViolation { .. }));
    assert_eq!(err.oauth_error_code(), "invalid_grant");

    let family = h
        .stores
        .refresh_tokens
        .find_by_family(record.family_id)
        .await
        .unwrap();
    assert_eq!(family.len(), 2);
    assert!(family.iter().all(|t| t.revoked));
    assert!(family.iter().all(|t| t.used_at.is_none()));

    // The sibling is dead too, even presented from the original device.
    let err = h
        .engine
        .refresh_access_token(&ctx(), &sibling_raw, CLIENT_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));

    let event = h
        .audit
        .wait_for(AuditAction::BindingViolation, Duration::from_secs(1))
        .await
        .expect("binding violation audited");
    assert!(!event.success);
}

#[tokio::test]
async fn test_ip_change_alone_is_a_violation_in_exact_mode() {
    let h = Harness::new();
    let login = h.login(None).await;

    let moved = RequestContext::new(USER_AGENT, ip("203.0.113.8"));
    let err = h
        .engine
        .refresh_access_token(&moved, &login.refresh_token, CLIENT_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BindingViolation { .. }));
}

#[tokio::test]
async fn test_subnet_mode_allows_same_network() {
    let mut config = common::config();
    config.binding.ip_match = IpMatchMode::Subnet;
    let h = Harness::with_config(config);
    let login = h.login(None).await;

    let moved = RequestContext::new(USER_AGENT, ip("203.0.113.200"));
    let rotated = h
        .engine
        .refresh_access_token(&moved, &login.refresh_token, CLIENT_ID)
        .await;
    assert!(rotated.is_ok());
}
