//! Access token signing.
//!
//! [`AccessTokenSigner`] is the seam the engine signs through. [`JwtSigner`]
//! implements it with `jsonwebtoken`, using either an HS256 shared secret or
//! an RS256 key pair.
//!
//! ```ignore
//! use keygate_auth::token::jwt::{JwtSigner, SigningAlgorithm};
//!
//! let signer = JwtSigner::generate_rsa()?;
//! let token = signer.sign(&claims)?;
//! let verified = signer.verify(&token)?;
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

use crate::AuthResult;
use crate::config::SigningConfig;
use crate::error::AuthError;
use crate::token::claims::{AccessTokenClaims, UnverifiedClaims};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to encode token: {message}")]
    EncodingError { message: String },

    #[error("Failed to decode token: {message}")]
    DecodingError { message: String },

    #[error("Token expired")]
    Expired,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid key: {message}")]
    InvalidKey { message: String },
}

impl JwtError {
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                Self::invalid_key(err.to_string())
            }
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::EncodingError { message } => AuthError::internal(message),
            JwtError::InvalidKey { message } => AuthError::configuration(message),
            other => AuthError::invalid_token(other.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256 and a shared secret.
    HS256,
    /// RSA with SHA-256.
    RS256,
}

impl SigningAlgorithm {
    /// Parses a configured algorithm name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for anything but `HS256` or `RS256`.
    pub fn parse(name: &str) -> Result<Self, JwtError> {
        match name {
            "HS256" => Ok(Self::HS256),
            "RS256" => Ok(Self::RS256),
            other => Err(JwtError::invalid_key(format!(
                "unsupported signing algorithm: {other}"
            ))),
        }
    }

    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::RS256 => Algorithm::RS256,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::RS256 => "RS256",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Signer
// ============================================================================

/// Signs access token claims.
///
/// Signing is CPU-only; implementations must not block on I/O.
pub trait AccessTokenSigner: Send + Sync {
    /// Signs `claims` into a compact token string.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded or signed.
    fn sign(&self, claims: &AccessTokenClaims) -> AuthResult<String>;
}

/// `jsonwebtoken`-backed signer and verifier.
pub struct JwtSigner {
    algorithm: SigningAlgorithm,
    kid: Option<String>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtSigner {
    /// Creates an HS256 signer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the secret is empty.
    pub fn hs256(secret: &[u8]) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::invalid_key("HS256 secret cannot be empty"));
        }
        Ok(Self {
            algorithm: SigningAlgorithm::HS256,
            kid: None,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        })
    }

    /// Creates an RS256 signer from PEM keys.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if either PEM cannot be parsed.
    pub fn rs256_from_pem(private_pem: &str, public_pem: &str) -> Result<Self, JwtError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        Ok(Self {
            algorithm: SigningAlgorithm::RS256,
            kid: None,
            encoding_key,
            decoding_key,
        })
    }

    /// Generates a fresh 2048-bit RSA key pair.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if key generation or PEM export fails.
    pub fn generate_rsa() -> Result<Self, JwtError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        let mut signer = Self::rs256_from_pem(&private_pem, &public_pem)?;
        signer.kid = Some(uuid::Uuid::new_v4().to_string());
        Ok(signer)
    }

    /// Builds a signer from configuration.
    ///
    /// RS256 without configured keys generates an ephemeral key pair; tokens
    /// signed by it do not survive a restart.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for an unknown algorithm or unusable key material.
    pub fn from_config(config: &SigningConfig) -> Result<Self, JwtError> {
        let signer = match SigningAlgorithm::parse(&config.algorithm)? {
            SigningAlgorithm::HS256 => {
                let secret = config
                    .hmac_secret
                    .as_deref()
                    .ok_or_else(|| JwtError::invalid_key("signing.hmac_secret is not set"))?;
                Self::hs256(secret.as_bytes())?
            }
            SigningAlgorithm::RS256 => {
                match (&config.private_key_pem, &config.public_key_pem) {
                    (Some(private_pem), Some(public_pem)) => {
                        Self::rs256_from_pem(private_pem, public_pem)?
                    }
                    _ => {
                        tracing::warn!("No RS256 key configured, generating an ephemeral key pair");
                        Self::generate_rsa()?
                    }
                }
            }
        };
        Ok(match &config.key_id {
            Some(kid) => signer.with_kid(kid.clone()),
            None => signer,
        })
    }

    /// Sets the key id placed in the JWT header.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self, claims: &AccessTokenClaims) -> Result<String, JwtError> {
        let mut header = Header::new(self.algorithm.to_jwt_algorithm());
        header.kid = self.kid.clone();
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Verifies the signature and expiry of a token and returns its claims.
    ///
    /// The issuer is scoped per client, so issuer and audience are left to
    /// the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, expired or badly signed.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        let mut validation = Validation::new(self.algorithm.to_jwt_algorithm());
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;
        Ok(decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)?.claims)
    }
}

impl AccessTokenSigner for JwtSigner {
    fn sign(&self, claims: &AccessTokenClaims) -> AuthResult<String> {
        Ok(self.encode(claims)?)
    }
}

impl fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSigner")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// Reads the payload of a compact JWT without verifying its signature.
///
/// Nothing returned here can be trusted; see [`UnverifiedClaims`].
///
/// # Errors
///
/// Returns `DecodingError` if the token is not three dot-separated segments
/// or the payload is not base64url JSON.
pub fn decode_unverified_claims(token: &str) -> Result<UnverifiedClaims, JwtError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(JwtError::decoding_error("token is not a compact JWT"));
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| JwtError::decoding_error(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| JwtError::decoding_error(e.to_string()))
}
