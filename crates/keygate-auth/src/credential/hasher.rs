//! Keyed lookup hashes.
//!
//! Codes and refresh tokens are high-entropy random strings, so a keyed
//! HMAC-SHA256 is enough to make the stored value useless without the
//! server key while keeping lookups deterministic.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

use crate::AuthResult;
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Generates an opaque credential with 256 bits of entropy (43 base64url characters).
#[must_use]
pub fn generate_opaque_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Deterministic keyed hash for code and token lookup.
#[derive(Clone)]
pub struct CredentialHasher {
    mac: HmacSha256,
}

impl CredentialHasher {
    /// Creates a hasher with the given server-side key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key is empty.
    pub fn new(key: impl AsRef<[u8]>) -> AuthResult<Self> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(AuthError::configuration("code hash key cannot be empty"));
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| AuthError::configuration(format!("invalid code hash key: {e}")))?;
        Ok(Self { mac })
    }

    /// Hashes a raw credential. Returns 64 lowercase hex characters.
    #[must_use]
    pub fn hash(&self, credential: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(credential.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Generates a fresh credential and returns it with its hash.
    #[must_use]
    pub fn generate(&self) -> (String, String) {
        let raw = generate_opaque_token();
        let hash = self.hash(&raw);
        (raw, hash)
    }
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher").finish_non_exhaustive()
    }
}
