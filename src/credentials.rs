use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};

/// API key or token. `Debug` never prints the value.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Only call when building an outgoing request.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Where provider credentials come from. The process environment in
/// production; a fixed map in tests.
pub trait CredentialSource {
    fn lookup(&self, name: &str) -> Option<String>;

    /// Lookup that treats empty or whitespace-only values as absent.
    fn key(&self, name: &str) -> Option<ApiKey> {
        self.lookup(name)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .map(ApiKey::new)
    }
}

pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl CredentialSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}
