//! Refresh-token device binding.
//!
//! At issuance the request's user agent and IP are hashed with a server
//! salt and stored on the refresh token. At rotation both are recomputed
//! from the new request and compared in constant time. In subnet mode the
//! IP is first reduced to its network address, so clients that move within
//! a /24 (IPv4) or /64 (IPv6) by default keep their binding.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::{BindingConfig, IpMatchMode};

/// Placeholder hashed when the request carries no IP.
const UNKNOWN_IP: &str = "unknown";

/// Binding hashes computed for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBinding {
    pub user_agent_hash: String,
    pub ip_hash: String,
}

/// Outcome of comparing a request against stored binding hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingCheck {
    Match,
    UserAgentMismatch,
    IpMismatch,
}

impl BindingCheck {
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    /// Short reason used in logs and audit details.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::UserAgentMismatch => "user agent mismatch",
            Self::IpMismatch => "ip mismatch",
        }
    }
}

/// Computes and checks device binding hashes.
#[derive(Clone)]
pub struct DeviceBinder {
    salt: Vec<u8>,
    config: BindingConfig,
}

impl DeviceBinder {
    #[must_use]
    pub fn new(salt: impl AsRef<[u8]>, config: BindingConfig) -> Self {
        Self {
            salt: salt.as_ref().to_vec(),
            config,
        }
    }

    /// Hashes the request's user agent and IP.
    #[must_use]
    pub fn bind(&self, user_agent: &str, ip: Option<IpAddr>) -> DeviceBinding {
        let normalized_ip = match ip {
            Some(ip) => self.normalize_ip(ip),
            None => UNKNOWN_IP.to_string(),
        };
        DeviceBinding {
            user_agent_hash: self.salted_hash("ua", user_agent),
            ip_hash: self.salted_hash("ip", &normalized_ip),
        }
    }

    /// Compares the request against stored hashes.
    #[must_use]
    pub fn check(
        &self,
        stored_user_agent_hash: &str,
        stored_ip_hash: &str,
        user_agent: &str,
        ip: Option<IpAddr>,
    ) -> BindingCheck {
        let presented = self.bind(user_agent, ip);
        let ua_ok: bool = presented
            .user_agent_hash
            .as_bytes()
            .ct_eq(stored_user_agent_hash.as_bytes())
            .into();
        let ip_ok: bool = presented
            .ip_hash
            .as_bytes()
            .ct_eq(stored_ip_hash.as_bytes())
            .into();

        if self.config.enforce_user_agent && !ua_ok {
            BindingCheck::UserAgentMismatch
        } else if !ip_ok {
            BindingCheck::IpMismatch
        } else {
            BindingCheck::Match
        }
    }

    fn normalize_ip(&self, ip: IpAddr) -> String {
        let ip = ip.to_canonical();
        match self.config.ip_match {
            IpMatchMode::Exact => ip.to_string(),
            IpMatchMode::Subnet => {
                let prefix = match ip {
                    IpAddr::V4(_) => self.config.ipv4_prefix,
                    IpAddr::V6(_) => self.config.ipv6_prefix,
                };
                match IpNetwork::new(ip, prefix) {
                    Ok(network) => format!("{}/{}", network.network(), prefix),
                    // Out-of-range prefixes are rejected by config validation.
                    Err(_) => ip.to_string(),
                }
            }
        }
    }

    fn salted_hash(&self, domain: &str, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.salt);
        hasher.update([0u8]);
        hasher.update(domain.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for DeviceBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBinder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    fn exact() -> DeviceBinder {
        DeviceBinder::new("salt", BindingConfig::default())
    }

    fn subnet() -> DeviceBinder {
        DeviceBinder::new(
            "salt",
            BindingConfig {
                ip_match: IpMatchMode::Subnet,
                ..BindingConfig::default()
            },
        )
    }

    #[test]
    fn test_same_device_matches() {
        let binder = exact();
        let b = binder.bind("Mozilla/5.0", ip("203.0.113.7"));
        assert_eq!(
            binder.check(&b.user_agent_hash, &b.ip_hash, "Mozilla/5.0", ip("203.0.113.7")),
            BindingCheck::Match
        );
    }

    #[test]
    fn test_user_agent_mismatch() {
        let binder = exact();
        let b = binder.bind("Mozilla/5.0", ip("203.0.113.7"));
        assert_eq!(
            binder.check(&b.user_agent_hash, &b.ip_hash, "curl/8.0", ip("203.0.113.7")),
            BindingCheck::UserAgentMismatch
        );
    }

    #[test]
    fn test_exact_mode_rejects_neighbor_ip() {
        let binder = exact();
        let b = binder.bind("ua", ip("203.0.113.7"));
        assert_eq!(
            binder.check(&b.user_agent_hash, &b.ip_hash, "ua", ip("203.0.113.8")),
            BindingCheck::IpMismatch
        );
    }

    #[test]
    fn test_subnet_mode_tolerates_same_network() {
        let binder = subnet();
        let b = binder.bind("ua", ip("203.0.113.7"));
        assert!(
            binder
                .check(&b.user_agent_hash, &b.ip_hash, "ua", ip("203.0.113.200"))
                .is_match()
        );
        assert_eq!(
            binder.check(&b.user_agent_hash, &b.ip_hash, "ua", ip("203.0.114.7")),
            BindingCheck::IpMismatch
        );

        let b6 = binder.bind("ua", ip("2001:db8:1:2::1"));
        assert!(
            binder
                .check(&b6.user_agent_hash, &b6.ip_hash, "ua", ip("2001:db8:1:2::ffff"))
                .is_match()
        );
    }

    #[test]
    fn test_ipv4_mapped_ipv6_is_canonicalized() {
        let binder = exact();
        let b = binder.bind("ua", ip("198.51.100.1"));
        assert!(
            binder
                .check(&b.user_agent_hash, &b.ip_hash, "ua", ip("::ffff:198.51.100.1"))
                .is_match()
        );
    }

    #[test]
    fn test_user_agent_not_enforced() {
        let binder = DeviceBinder::new(
            "salt",
            BindingConfig {
                enforce_user_agent: false,
                ..BindingConfig::default()
            },
        );
        let b = binder.bind("ua-1", ip("203.0.113.7"));
        assert!(
            binder
                .check(&b.user_agent_hash, &b.ip_hash, "ua-2", ip("203.0.113.7"))
                .is_match()
        );
    }

    #[test]
    fn test_salt_changes_hashes() {
        let a = DeviceBinder::new("salt-a", BindingConfig::default()).bind("ua", None);
        let b = DeviceBinder::new("salt-b", BindingConfig::default()).bind("ua", None);
        assert_ne!(a, b);
    }
}
