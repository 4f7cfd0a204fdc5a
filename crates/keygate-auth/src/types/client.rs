//! OAuth client registration, as consumed by the engine.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// RFC 6749 section 3.3 `scope-token`.
static SCOPE_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[\x21\x23-\x5B\x5D-\x7E]+$").ok());

/// Returns `true` if `token` is a syntactically valid scope token.
#[must_use]
pub fn is_valid_scope_token(token: &str) -> bool {
    SCOPE_TOKEN.as_ref().is_some_and(|re| re.is_match(token))
}

/// A registered client application.
///
/// Client administration happens elsewhere; the engine only reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientApp {
    /// Public client identifier.
    pub client_id: String,

    /// Display name.
    pub name: String,

    /// Argon2 PHC hash of the client secret. `None` for public clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_hash: Option<String>,

    /// Registered redirect URIs. Matching is exact, byte for byte.
    pub redirect_uris: Vec<String>,

    /// Scopes this client may request.
    pub allowed_scopes: Vec<String>,

    /// Whether the client authenticates with a secret.
    pub is_confidential: bool,

    /// Disabled clients are treated as unknown.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Registration problems detected by [`ClientApp::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClientValidationError {
    #[error("client_id cannot be empty")]
    EmptyClientId,

    #[error("at least one redirect URI is required")]
    NoRedirectUris,

    #[error("redirect URI is not an absolute URL: {0}")]
    InvalidRedirectUri(String),

    #[error("redirect URI must not contain a fragment: {0}")]
    RedirectUriFragment(String),

    #[error("confidential client has no secret hash")]
    MissingSecret,

    #[error("public client must not have a secret hash")]
    UnexpectedSecret,

    #[error("invalid scope token: {0:?}")]
    InvalidScope(String),
}

impl ClientApp {
    /// Returns `true` if `redirect_uri` exactly matches a registered URI.
    ///
    /// No prefix, wildcard or normalization is applied: `https://a.com/cb`
    /// does not match a registration of `https://a.com/cb/`.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|r| r == redirect_uri)
    }

    /// Returns `true` if a single scope token is allowed for this client.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.allowed_scopes.iter().any(|s| s == scope)
    }

    /// Returns the first space-delimited scope token that is not allowed.
    #[must_use]
    pub fn first_disallowed_scope<'a>(&self, scope: &'a str) -> Option<&'a str> {
        scope
            .split_ascii_whitespace()
            .find(|token| !self.is_scope_allowed(token))
    }

    /// Checks the registration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }
        if self.redirect_uris.is_empty() {
            return Err(ClientValidationError::NoRedirectUris);
        }
        for uri in &self.redirect_uris {
            let parsed = Url::parse(uri)
                .map_err(|_| ClientValidationError::InvalidRedirectUri(uri.clone()))?;
            if parsed.fragment().is_some() {
                return Err(ClientValidationError::RedirectUriFragment(uri.clone()));
            }
        }
        if let Some(scope) = self
            .allowed_scopes
            .iter()
            .find(|s| !is_valid_scope_token(s))
        {
            return Err(ClientValidationError::InvalidScope(scope.clone()));
        }
        match (self.is_confidential, self.client_secret_hash.is_some()) {
            (true, false) => Err(ClientValidationError::MissingSecret),
            (false, true) => Err(ClientValidationError::UnexpectedSecret),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientApp {
        ClientApp {
            client_id: "c1".to_string(),
            name: "App".to_string(),
            client_secret_hash: None,
            redirect_uris: vec!["https://a.com/cb/".to_string()],
            allowed_scopes: vec!["profile".to_string(), "email".to_string()],
            is_confidential: false,
            active: true,
        }
    }

    #[test]
    fn test_redirect_uri_exact_match() {
        let client = client();
        assert!(client.is_redirect_uri_allowed("https://a.com/cb/"));
        assert!(!client.is_redirect_uri_allowed("https://a.com/cb"));
        assert!(!client.is_redirect_uri_allowed("https://a.com/cb/extra"));
        assert!(!client.is_redirect_uri_allowed("HTTPS://a.com/cb/"));
    }

    #[test]
    fn test_first_disallowed_scope() {
        let client = client();
        assert_eq!(client.first_disallowed_scope("profile email"), None);
        assert_eq!(client.first_disallowed_scope("profile admin"), Some("admin"));
        assert_eq!(client.first_disallowed_scope(""), None);
    }

    #[test]
    fn test_validate() {
        assert!(client().validate().is_ok());

        let mut c = client();
        c.redirect_uris = vec!["/relative".to_string()];
        assert!(matches!(
            c.validate(),
            Err(ClientValidationError::InvalidRedirectUri(_))
        ));

        let mut c = client();
        c.redirect_uris = vec!["https://a.com/cb#frag".to_string()];
        assert!(matches!(
            c.validate(),
            Err(ClientValidationError::RedirectUriFragment(_))
        ));

        let mut c = client();
        c.is_confidential = true;
        assert_eq!(c.validate(), Err(ClientValidationError::MissingSecret));

        let mut c = client();
        c.allowed_scopes.push("bad\"scope".to_string());
        assert_eq!(
            c.validate(),
            Err(ClientValidationError::InvalidScope("bad\"scope".to_string()))
        );
    }

    #[test]
    fn test_scope_token_grammar() {
        assert!(is_valid_scope_token("profile"));
        assert!(is_valid_scope_token("users:read"));
        assert!(!is_valid_scope_token(""));
        assert!(!is_valid_scope_token("a b"));
        assert!(!is_valid_scope_token("back\\slash"));
    }
}
