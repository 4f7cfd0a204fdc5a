use std::fs;
use std::time::Duration;

use keygate_auth::config::IpMatchMode;
use keygate_auth::config::loader::load_config;

#[test]
fn config_parsing_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("keygate.toml");

    let toml_content = r#"
issuer = "https://id.example.com"

[oauth]
authorization_code_lifetime = "5m"
access_token_lifetime = "15m"
refresh_token_lifetime = "14d"

[credentials]
code_hash_key = "file-code-hash-key-0123456789abcdef"
binding_salt = "file-binding-salt-0123456789abcdef"

[binding]
ip_match = "subnet"
ipv4_prefix = 16

[signing]
algorithm = "HS256"
hmac_secret = "file-signing-secret"

[revocation]
session_marker_ttl = "2h"
"#;
    fs::write(&path, toml_content).expect("write toml");

    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.oauth.authorization_code_lifetime, Duration::from_secs(300));
    assert_eq!(cfg.oauth.access_token_lifetime, Duration::from_secs(900));
    assert_eq!(
        cfg.oauth.refresh_token_lifetime,
        Duration::from_secs(14 * 24 * 3600)
    );
    assert_eq!(cfg.binding.ip_match, IpMatchMode::Subnet);
    assert_eq!(cfg.binding.ipv4_prefix, 16);
    assert_eq!(cfg.binding.ipv6_prefix, 64);
    assert_eq!(cfg.revocation.session_marker_ttl, Duration::from_secs(7200));
    assert_eq!(cfg.revocation.key_prefix, "keygate:revoked");

    // Invalid prefix fails validation
    let bad = toml_content.replace("ipv4_prefix = 16", "ipv4_prefix = 40");
    fs::write(&path, bad).expect("write toml");
    let err = load_config(path.to_str()).unwrap_err();
    assert!(err.to_string().contains("ipv4_prefix"));

    // Missing keys fail validation
    fs::write(&path, "issuer = \"https://id.example.com\"\n").expect("write toml");
    assert!(load_config(path.to_str()).is_err());
}

#[test]
fn config_serializes_back_to_toml() {
    let mut cfg = keygate_auth::KeygateConfig::default();
    cfg.credentials.code_hash_key = "x".repeat(40);
    let text = toml::to_string(&cfg).expect("serialize");
    assert!(text.contains("[binding]"));
    assert!(text.contains("access_token_lifetime = \"1h\""));
}
