//! Access token claims.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Claims carried by a signed access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    /// Issuer, scoped to the client: `{issuer}/{client_id}`.
    pub iss: String,

    /// Subject (user id).
    pub sub: String,

    /// Audience (the client id).
    pub aud: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// JWT ID, the denylist key.
    pub jti: String,

    /// Space-separated granted scope.
    pub scope: String,

    pub client_id: String,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub permissions: Vec<String>,

    #[serde(default)]
    pub is_superadmin: bool,

    /// Organization context of the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,
}

impl AccessTokenClaims {
    /// Seconds until expiry at `now`; zero or negative once expired.
    #[must_use]
    pub fn remaining_seconds(&self, now: OffsetDateTime) -> i64 {
        self.exp - now.unix_timestamp()
    }

    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.remaining_seconds(now) <= 0
    }
}

/// The subset of claims read from a token without checking its signature.
///
/// Used for revocation bookkeeping. Every field is attacker-controlled: a
/// forged payload can carry any victim's `jti`, so callers must authenticate
/// the party supplying the token (or verify it) before acting on these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UnverifiedClaims {
    #[serde(default)]
    pub jti: Option<String>,

    #[serde(default)]
    pub sub: Option<String>,

    #[serde(default)]
    pub exp: Option<i64>,

    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub org_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_serialization() {
        let org = Uuid::new_v4();
        let claims = AccessTokenClaims {
            iss: "https://id.example.com/c1".to_string(),
            sub: Uuid::new_v4().to_string(),
            aud: "c1".to_string(),
            exp: 1_700_003_600,
            iat: 1_700_000_000,
            jti: "j1".to_string(),
            scope: "profile".to_string(),
            client_id: "c1".to_string(),
            roles: vec!["editor".to_string()],
            permissions: vec!["docs:write".to_string()],
            is_superadmin: false,
            org_id: Some(org),
        };

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["aud"], "c1");
        assert_eq!(json["org_id"], org.to_string());

        let parsed: AccessTokenClaims = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, claims);
    }

    #[test]
    fn test_remaining_seconds() {
        let now = OffsetDateTime::now_utc();
        let claims = AccessTokenClaims {
            iss: String::new(),
            sub: String::new(),
            aud: String::new(),
            exp: now.unix_timestamp() + 60,
            iat: now.unix_timestamp(),
            jti: String::new(),
            scope: String::new(),
            client_id: String::new(),
            roles: vec![],
            permissions: vec![],
            is_superadmin: false,
            org_id: None,
        };
        assert_eq!(claims.remaining_seconds(now), 60);
        assert!(!claims.is_expired_at(now));
        assert!(claims.is_expired_at(now + time::Duration::seconds(60)));
    }

    #[test]
    fn test_unverified_claims_tolerate_missing_fields() {
        let parsed: UnverifiedClaims = serde_json::from_str(r#"{"jti":"abc"}"#).unwrap();
        assert_eq!(parsed.jti.as_deref(), Some("abc"));
        assert!(parsed.exp.is_none());
    }
}
