//! Client secret hashing.
//!
//! Confidential clients authenticate with a secret whose Argon2id PHC hash is
//! stored in the client registry.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Hashes a client secret for storage.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails.
pub fn hash_client_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verifies a presented secret against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch. Errors only on a malformed hash.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if `hash` is not a valid PHC string.
pub fn verify_client_secret(secret: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_client_secret("s3cret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_client_secret("s3cret", &hash).unwrap());
        assert!(!verify_client_secret("wrong", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(
            hash_client_secret("same").unwrap(),
            hash_client_secret("same").unwrap()
        );
    }

    #[test]
    fn test_malformed_hash() {
        assert!(verify_client_secret("s3cret", "not-a-phc-string").is_err());
    }
}
