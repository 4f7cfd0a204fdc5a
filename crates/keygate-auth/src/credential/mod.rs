//! Credential hashing and device binding.
//!
//! - [`CredentialHasher`] - keyed, deterministic lookup hashes for codes and refresh tokens
//! - [`DeviceBinder`] - salted user-agent and IP hashes bound to refresh tokens
//! - [`secret`] - Argon2 hashing of confidential client secrets

pub mod binding;
pub mod hasher;
pub mod secret;

pub use binding::{BindingCheck, DeviceBinder, DeviceBinding};
pub use hasher::{CredentialHasher, generate_opaque_token};
pub use secret::{hash_client_secret, verify_client_secret};
