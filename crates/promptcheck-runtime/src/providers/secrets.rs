//! Provider credentials that never print.
//!
//! A credential is looked up in this order:
//! 1. `<key>` in the gateway config (inline secret)
//! 2. the environment variable named by `<key>_env` in the gateway config
//! 3. the provider's default environment variable
//!
//! Empty values count as missing. The value is wrapped in a
//! [`SecretString`] immediately and only [`ApiCredential::expose`] reads it.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Inline in the gateway config
    Config,
    /// From an environment variable
    Environment,
    /// Passed in by code
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// Describes one credential a gateway needs.
#[derive(Debug, Clone, Copy)]
pub struct CredentialSpec {
    /// Key in the gateway config, e.g. `api_key`
    pub config_key: &'static str,
    /// Environment variable used when the config names none
    pub default_env: &'static str,
    /// Human-readable name for errors and logs
    pub name: &'static str,
}

impl CredentialSpec {
    /// Environment variable to consult for this config.
    fn env_var<'a>(&self, config: &'a JsonValue) -> &'a str {
        config
            .get(format!("{}_env", self.config_key))
            .and_then(JsonValue::as_str)
            .filter(|v| !v.is_empty())
            .unwrap_or(self.default_env)
    }
}

/// A securely stored API credential.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Resolve a required credential for a gateway config.
    pub fn resolve(config: &JsonValue, spec: &CredentialSpec) -> Result<Self, ProviderError> {
        Self::resolve_optional(config, spec).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "{} required: set '{}' in config or the {} environment variable",
                spec.name,
                spec.config_key,
                spec.env_var(config)
            ))
        })
    }

    /// Resolve a credential that the backend may not need.
    pub fn resolve_optional(config: &JsonValue, spec: &CredentialSpec) -> Option<Self> {
        if let Some(value) = config
            .get(spec.config_key)
            .and_then(JsonValue::as_str)
            .filter(|v| !v.is_empty())
        {
            return Some(Self::new(value, CredentialSource::Config, spec.name));
        }

        std::env::var(spec.env_var(config))
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| Self::new(v, CredentialSource::Environment, spec.name))
    }

    /// Whether a credential could be resolved, without loading it.
    pub fn is_available(config: &JsonValue, spec: &CredentialSpec) -> bool {
        Self::resolve_optional(config, spec).is_some()
    }

    /// The secret value. Call only where it is sent, never store the result.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
