//! Shared fixture for engine integration tests.

#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::Arc;

use keygate_auth::audit::MemoryAuditSink;
use keygate_auth::credential::hash_client_secret;
use keygate_auth::oauth::{PkceChallenge, PkceVerifier};
use keygate_auth::prelude::*;
use keygate_auth::storage::memory::InMemoryStores;
use uuid::Uuid;

pub const CLIENT_ID: &str = "c1";
pub const CLIENT_SECRET: &str = "s3cret-client-value";
pub const REDIRECT_URI: &str = "https://app/cb";
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64)";
pub const SIGNING_SECRET: &[u8] = b"integration-signing-secret";

pub fn config() -> KeygateConfig {
    let mut config = KeygateConfig::default();
    config.issuer = "https://id.example.com".to_string();
    config.credentials.code_hash_key = "integration-code-hash-key-0123456789".to_string();
    config.credentials.binding_salt = "integration-binding-salt-0123456789".to_string();
    config.signing.algorithm = "HS256".to_string();
    config.signing.hmac_secret = Some(String::from_utf8_lossy(SIGNING_SECRET).into_owned());
    config
}

pub fn ip(s: &str) -> Option<IpAddr> {
    Some(s.parse().unwrap())
}

pub fn ctx() -> RequestContext {
    RequestContext::new(USER_AGENT, ip("203.0.113.7"))
}

pub struct Harness {
    pub engine: AuthEngine,
    pub stores: InMemoryStores,
    pub audit: Arc<MemoryAuditSink>,
    pub signer: Arc<JwtSigner>,
    pub config: KeygateConfig,
    pub user: User,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: KeygateConfig) -> Self {
        let stores = InMemoryStores::new();
        stores.clients.insert(ClientApp {
            client_id: CLIENT_ID.to_string(),
            name: "Integration App".to_string(),
            client_secret_hash: Some(hash_client_secret(CLIENT_SECRET).unwrap()),
            redirect_uris: vec![REDIRECT_URI.to_string()],
            allowed_scopes: vec!["profile".to_string(), "email".to_string()],
            is_confidential: true,
            active: true,
        });
        let user = User::new("alice@example.com");
        stores.users.insert_user(user.clone());

        let audit = Arc::new(MemoryAuditSink::new());
        let signer = Arc::new(JwtSigner::hs256(SIGNING_SECRET).unwrap());
        let engine =
            AuthEngine::new(&config, stores.as_auth_stores(), signer.clone(), audit.clone())
                .unwrap();
        Self {
            engine,
            stores,
            audit,
            signer,
            config,
            user,
        }
    }

    /// Issues a code for `user_id` and returns it with its PKCE verifier.
    pub async fn issue_code_for(
        &self,
        user_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> (String, PkceVerifier) {
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        let code = self
            .engine
            .issue_code(
                &ctx(),
                IssueCodeRequest {
                    client_id: CLIENT_ID.to_string(),
                    redirect_uri: REDIRECT_URI.to_string(),
                    scope: "profile".to_string(),
                    code_challenge: Some(challenge.into_inner()),
                    code_challenge_method: Some("S256".to_string()),
                    user_id,
                    organization_id,
                },
            )
            .await
            .unwrap();
        (code, verifier)
    }

    pub fn exchange_request(&self, code: &str, verifier: &PkceVerifier) -> ExchangeCodeRequest {
        ExchangeCodeRequest {
            code: code.to_string(),
            client_id: CLIENT_ID.to_string(),
            client_secret: Some(CLIENT_SECRET.to_string()),
            redirect_uri: REDIRECT_URI.to_string(),
            code_verifier: verifier.as_str().to_string(),
        }
    }

    /// Runs the code flow for the fixture user and returns the token response.
    pub async fn login(&self, organization_id: Option<Uuid>) -> TokenResponse {
        let (code, verifier) = self.issue_code_for(self.user.id, organization_id).await;
        self.engine
            .exchange_code_for_tokens(&ctx(), self.exchange_request(&code, &verifier))
            .await
            .unwrap()
    }

    /// Hashes a raw refresh token the way the engine does.
    pub fn refresh_hash(&self, raw: &str) -> String {
        keygate_auth::credential::CredentialHasher::new(&self.config.credentials.code_hash_key)
            .unwrap()
            .hash(raw)
    }

    pub async fn refresh_record(&self, raw: &str) -> OAuthRefreshToken {
        self.stores
            .refresh_tokens
            .find_by_hash(&self.refresh_hash(raw))
            .await
            .unwrap()
            .unwrap()
    }
}
