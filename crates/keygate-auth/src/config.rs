//! Engine configuration.
//!
//! Lifetimes, hashing keys, device-binding strictness, signing keys and
//! revocation marker TTLs all live here. Configuration is read from an
//! optional TOML file with `KEYGATE__*` environment overrides, see
//! [`loader::load_config`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the token lifecycle engine.
///
/// # Example (TOML)
///
/// ```toml
/// issuer = "https://id.example.com"
///
/// [oauth]
/// access_token_lifetime = "1h"
/// refresh_token_lifetime = "30d"
///
/// [credentials]
/// code_hash_key = "a-long-random-server-side-secret-value"
/// binding_salt = "another-long-random-server-side-secret"
///
/// [binding]
/// ip_match = "subnet"
/// ipv4_prefix = 24
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeygateConfig {
    /// Base issuer URL. Access tokens carry `{issuer}/{client_id}` as `iss`.
    pub issuer: String,

    /// Code and token lifetimes.
    pub oauth: OAuthConfig,

    /// Server-side keys for lookup hashes and device binding.
    pub credentials: CredentialsConfig,

    /// Refresh-token device binding.
    pub binding: BindingConfig,

    /// Access-token signing.
    pub signing: SigningConfig,

    /// Denylist and session revocation markers.
    pub revocation: RevocationConfig,

    /// Audit dispatch.
    pub audit: AuditConfig,
}

impl Default for KeygateConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            oauth: OAuthConfig::default(),
            credentials: CredentialsConfig::default(),
            binding: BindingConfig::default(),
            signing: SigningConfig::default(),
            revocation: RevocationConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// OAuth 2.0 lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime, reported as `expires_in`.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime. Every rotation starts a fresh window.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: Duration::from_secs(600), // 10 minutes
            access_token_lifetime: Duration::from_secs(3600),      // 1 hour
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
        }
    }
}

/// Minimum length in bytes of server-side hashing keys.
pub const MIN_KEY_LENGTH: usize = 32;

/// Server-side secrets used for deterministic hashing.
///
/// Both values must be stable across restarts and shared by every instance,
/// otherwise stored hashes stop matching.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// HMAC key for authorization-code and refresh-token lookup hashes.
    pub code_hash_key: String,

    /// Salt mixed into user-agent and IP binding hashes.
    pub binding_salt: String,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("code_hash_key", &"<redacted>")
            .field("binding_salt", &"<redacted>")
            .finish()
    }
}

/// How strictly the IP address of a refresh request must match the issuance IP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IpMatchMode {
    /// The address must be identical.
    #[default]
    Exact,
    /// The address must fall in the same network prefix.
    Subnet,
}

/// Refresh-token device binding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BindingConfig {
    /// IP comparison strictness.
    pub ip_match: IpMatchMode,

    /// Prefix length used for IPv4 addresses in subnet mode.
    pub ipv4_prefix: u8,

    /// Prefix length used for IPv6 addresses in subnet mode.
    pub ipv6_prefix: u8,

    /// Compare the user agent as well as the IP.
    pub enforce_user_agent: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            ip_match: IpMatchMode::Exact,
            ipv4_prefix: 24,
            ipv6_prefix: 64,
            enforce_user_agent: true,
        }
    }
}

/// Access-token signing configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm: `HS256` or `RS256`.
    pub algorithm: String,

    /// Shared secret for `HS256`.
    pub hmac_secret: Option<String>,

    /// PKCS#8 PEM private key for `RS256`. A key is generated at startup when absent.
    pub private_key_pem: Option<String>,

    /// PEM public key matching `private_key_pem`.
    pub public_key_pem: Option<String>,

    /// Key identifier placed in the JWT header.
    pub key_id: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            hmac_secret: None,
            private_key_pem: None,
            public_key_pem: None,
            key_id: None,
        }
    }
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("algorithm", &self.algorithm)
            .field("hmac_secret", &self.hmac_secret.as_ref().map(|_| "<redacted>"))
            .field(
                "private_key_pem",
                &self.private_key_pem.as_ref().map(|_| "<redacted>"),
            )
            .field("public_key_pem", &self.public_key_pem.is_some())
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// Revocation marker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RevocationConfig {
    /// TTL for a denylisted token that carries no `exp` claim.
    #[serde(with = "humantime_serde")]
    pub fallback_ttl: Duration,

    /// TTL for user, organization and user-in-organization markers.
    #[serde(with = "humantime_serde")]
    pub session_marker_ttl: Duration,

    /// Upper bound on a denylist entry's TTL, whatever the token's `exp`.
    #[serde(with = "humantime_serde")]
    pub max_denylist_ttl: Duration,

    /// Key prefix for every marker written to the revocation store.
    pub key_prefix: String,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            fallback_ttl: Duration::from_secs(3600),
            session_marker_ttl: Duration::from_secs(24 * 3600),
            max_denylist_ttl: Duration::from_secs(30 * 24 * 3600),
            key_prefix: "keygate:revoked".to_string(),
        }
    }
}

/// Audit dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Capacity of the channel between the engine and the audit worker.
    /// Events are dropped with a warning when it is full.
    pub channel_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl From<ConfigError> for crate::error::AuthError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

impl KeygateConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is missing or out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }
        url::Url::parse(&self.issuer)
            .map_err(|e| ConfigError::InvalidValue(format!("issuer is not a URL: {e}")))?;

        if self.oauth.authorization_code_lifetime.is_zero()
            || self.oauth.access_token_lifetime.is_zero()
            || self.oauth.refresh_token_lifetime.is_zero()
        {
            return Err(ConfigError::InvalidValue(
                "oauth lifetimes must be > 0".to_string(),
            ));
        }

        if self.credentials.code_hash_key.is_empty() {
            return Err(ConfigError::Missing(
                "credentials.code_hash_key".to_string(),
            ));
        }
        if self.credentials.binding_salt.is_empty() {
            return Err(ConfigError::Missing("credentials.binding_salt".to_string()));
        }
        if self.credentials.code_hash_key.len() < MIN_KEY_LENGTH
            || self.credentials.binding_salt.len() < MIN_KEY_LENGTH
        {
            return Err(ConfigError::InvalidValue(format!(
                "credentials keys must be at least {MIN_KEY_LENGTH} bytes"
            )));
        }

        if self.binding.ipv4_prefix > 32 {
            return Err(ConfigError::InvalidValue(
                "binding.ipv4_prefix must be <= 32".to_string(),
            ));
        }
        if self.binding.ipv6_prefix > 128 {
            return Err(ConfigError::InvalidValue(
                "binding.ipv6_prefix must be <= 128".to_string(),
            ));
        }

        match self.signing.algorithm.as_str() {
            "HS256" => {
                if self.signing.hmac_secret.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::Missing("signing.hmac_secret".to_string()));
                }
            }
            "RS256" => {
                if self.signing.private_key_pem.is_some() != self.signing.public_key_pem.is_some()
                {
                    return Err(ConfigError::InvalidValue(
                        "signing.private_key_pem and signing.public_key_pem must be set together"
                            .to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be HS256 or RS256",
                    other
                )));
            }
        }

        if self.revocation.fallback_ttl.is_zero()
            || self.revocation.session_marker_ttl.is_zero()
            || self.revocation.max_denylist_ttl.is_zero()
        {
            return Err(ConfigError::InvalidValue(
                "revocation TTLs must be > 0".to_string(),
            ));
        }
        if self.revocation.key_prefix.is_empty() {
            return Err(ConfigError::InvalidValue(
                "revocation.key_prefix cannot be empty".to_string(),
            ));
        }

        if self.audit.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "audit.channel_capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

pub mod loader {
    use super::{ConfigError, KeygateConfig};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Environment variable prefix, e.g. `KEYGATE__OAUTH__ACCESS_TOKEN_LIFETIME=30m`.
    pub const ENV_PREFIX: &str = "KEYGATE";

    /// Loads configuration from an optional TOML file and the environment.
    ///
    /// Without a path, `keygate.toml` in the working directory is used when
    /// present. Environment variables win over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be merged or the result does
    /// not validate.
    pub fn load_config(path: Option<&str>) -> Result<KeygateConfig, ConfigError> {
        let mut builder = Config::builder();
        let file = path
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("keygate.toml"));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: KeygateConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> KeygateConfig {
    let mut config = KeygateConfig::default();
    config.issuer = "https://id.example.com".to_string();
    config.credentials.code_hash_key = "test-code-hash-key-0123456789abcdef".to_string();
    config.credentials.binding_salt = "test-binding-salt-0123456789abcdef".to_string();
    config.signing.algorithm = "HS256".to_string();
    config.signing.hmac_secret = Some("test-signing-secret".to_string());
    config
}
