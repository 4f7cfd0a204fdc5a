//! PKCE (Proof Key for Code Exchange), RFC 7636, S256 only.
//!
//! Authorization codes are bound to a code challenge when issued. At
//! exchange time [`verify`] recomputes `BASE64URL(SHA256(code_verifier))`
//! and compares it to the stored challenge in constant time. Any method
//! other than `S256` fails closed.
//!
//! # Example
//!
//! ```
//! use keygate_auth::oauth::pkce::{self, PkceChallenge, PkceVerifier};
//!
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//!
//! assert!(pkce::verify(verifier.as_str(), challenge.as_str(), "S256").is_ok());
//! assert!(pkce::verify(verifier.as_str(), challenge.as_str(), "plain").is_err());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AuthError;

/// Length of an S256 challenge: 32 digest bytes in unpadded base64url.
pub const S256_CHALLENGE_LENGTH: usize = 43;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PkceError {
    /// No code challenge was supplied with the authorization request.
    #[error("code_challenge is required")]
    MissingChallenge,

    /// Challenge method other than S256.
    #[error("Unsupported challenge method: {0}. Only S256 is supported.")]
    UnsupportedMethod(String),

    /// Challenge is not a 43-character base64url SHA-256 digest.
    #[error("Invalid challenge format: must be a base64url SHA-256 digest")]
    InvalidChallengeFormat,

    /// Verifier length is outside 43..=128.
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains characters outside `[A-Za-z0-9-._~]`.
    #[error("Invalid verifier characters")]
    InvalidVerifierCharacters,

    /// The verifier does not hash to the stored challenge.
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Returns `true` if the error concerns the authorization request's challenge.
    #[must_use]
    pub fn is_challenge_error(&self) -> bool {
        matches!(
            self,
            Self::MissingChallenge | Self::UnsupportedMethod(_) | Self::InvalidChallengeFormat
        )
    }

    /// Returns `true` if the error concerns the token request's verifier.
    #[must_use]
    pub fn is_verifier_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidVerifierLength(_)
                | Self::InvalidVerifierCharacters
                | Self::VerificationFailed
        )
    }
}

impl From<PkceError> for AuthError {
    fn from(err: PkceError) -> Self {
        if err.is_challenge_error() {
            AuthError::pkce_required(err.to_string())
        } else {
            AuthError::invalid_grant(err.to_string())
        }
    }
}

// =============================================================================
// Challenge Method
// =============================================================================

/// PKCE challenge method. Only S256 exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PkceChallengeMethod {
    #[default]
    S256,
}

impl PkceChallengeMethod {
    /// Parses a method name. The comparison is exact and case-sensitive.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` for anything but `"S256"`.
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// A syntactically valid code verifier.
#[derive(Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Validates a verifier received from a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is outside 43..=128 or a character is
    /// not unreserved.
    pub fn new(verifier: impl Into<String>) -> Result<Self, PkceError> {
        let verifier = verifier.into();
        let len = verifier.len();
        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }
        if !verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }
        Ok(Self(verifier))
    }

    /// Generates a verifier from 32 random bytes (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PkceVerifier(<redacted>)")
    }
}

// =============================================================================
// Challenge
// =============================================================================

/// An S256 code challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Computes `BASE64URL(SHA256(ASCII(code_verifier)))`.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        Self(s256(verifier.as_str()))
    }

    /// Validates a challenge received in an authorization request.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::InvalidChallengeFormat` unless the value decodes to
    /// exactly 32 bytes of unpadded base64url.
    pub fn new(challenge: impl Into<String>) -> Result<Self, PkceError> {
        let challenge = challenge.into();
        if challenge.len() != S256_CHALLENGE_LENGTH {
            return Err(PkceError::InvalidChallengeFormat);
        }
        match URL_SAFE_NO_PAD.decode(&challenge) {
            Ok(bytes) if bytes.len() == 32 => Ok(Self(challenge)),
            _ => Err(PkceError::InvalidChallengeFormat),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

fn s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Validates the PKCE parameters of an authorization request.
///
/// # Errors
///
/// Fails when the challenge is absent, the method is missing or not `S256`,
/// or the challenge is malformed.
pub fn require_challenge(
    code_challenge: Option<&str>,
    code_challenge_method: Option<&str>,
) -> Result<(PkceChallenge, PkceChallengeMethod), PkceError> {
    let challenge = code_challenge
        .filter(|c| !c.is_empty())
        .ok_or(PkceError::MissingChallenge)?;
    let method = PkceChallengeMethod::parse(code_challenge_method.unwrap_or(""))?;
    Ok((PkceChallenge::new(challenge)?, method))
}

/// Verifies `code_verifier` against a stored challenge.
///
/// This is a pure check. The digest comparison is constant-time.
///
/// # Errors
///
/// Returns `UnsupportedMethod` for any method other than `S256`, a verifier
/// syntax error, or `VerificationFailed`.
pub fn verify(code_verifier: &str, stored_challenge: &str, method: &str) -> Result<(), PkceError> {
    PkceChallengeMethod::parse(method)?;
    let verifier = PkceVerifier::new(code_verifier)?;
    let computed = s256(verifier.as_str());
    if computed.as_bytes().ct_eq(stored_challenge.as_bytes()).into() {
        Ok(())
    } else {
        Err(PkceError::VerificationFailed)
    }
}

// =============================================================================
// Tests
// =============================================================================
