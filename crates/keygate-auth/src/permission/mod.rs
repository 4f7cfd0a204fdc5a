//! Permission resolution.
//!
//! Every token-issuing path obtains roles and permissions through
//! [`PermissionResolver`]. No other code filters permissions.

mod resolver;

pub use resolver::{PermissionResolver, ResolvedPermissions};
