//! Gateway factories and the registry that resolves suite provider configs.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let gateways = registry.resolve_all(&suite.providers)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{GatewayMap, ProviderError, ProviderGateway};

/// Creates gateways of one provider type from JSON configuration.
pub trait ProviderFactory: Send + Sync {
    /// Unique type name, matched against the config's `type` field.
    fn provider_type(&self) -> &'static str;

    /// Create a gateway from provider-specific configuration.
    fn create(&self, config: &JsonValue) -> Result<Arc<dyn ProviderGateway>, ProviderError>;

    /// Validate configuration without creating a gateway.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    /// Defaults for optional fields.
    fn default_config(&self) -> JsonValue {
        serde_json::json!({})
    }

    fn description(&self) -> &'static str {
        "Model provider"
    }
}

/// Provider type name to factory.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any with the same type name.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    /// Create a gateway from a type name and configuration.
    pub fn create(
        &self,
        provider_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn ProviderGateway>, ProviderError> {
        self.factory(provider_type)?.create(config)
    }

    /// Validate configuration for a provider type.
    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factory(provider_type)?.validate_config(config)
    }

    /// Build one gateway per selector from `{selector: {type, ...}}`.
    ///
    /// Fails on the first selector whose config is unusable, naming it.
    pub fn resolve_all(
        &self,
        providers: &BTreeMap<String, JsonValue>,
    ) -> Result<GatewayMap, ProviderError> {
        let mut gateways = GatewayMap::new();

        for (selector, config) in providers {
            let gateway = self.resolve_one(config).map_err(|e| ProviderError::Selector {
                selector: selector.clone(),
                source: Box::new(e),
            })?;

            tracing::debug!(provider = %selector, kind = gateway.name(), "Gateway resolved");
            gateways.insert(selector.clone(), gateway);
        }

        Ok(gateways)
    }

    /// Validate every selector's config without building gateways.
    pub fn validate_all(&self, providers: &BTreeMap<String, JsonValue>) -> Vec<ProviderError> {
        providers
            .iter()
            .filter_map(|(selector, config)| {
                provider_type_of(config)
                    .and_then(|t| self.validate(t, config))
                    .err()
                    .map(|e| ProviderError::Selector {
                        selector: selector.clone(),
                        source: Box::new(e),
                    })
            })
            .collect()
    }

    fn resolve_one(&self, config: &JsonValue) -> Result<Arc<dyn ProviderGateway>, ProviderError> {
        let provider_type = provider_type_of(config)?;
        self.validate(provider_type, config)?;
        self.create(provider_type, config)
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }

    /// Registered type names, sorted.
    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// `(type, description)` for every registered factory.
    pub fn describe(&self) -> Vec<(&str, &'static str)> {
        self.factories
            .iter()
            .map(|(name, factory)| (name.as_str(), factory.description()))
            .collect()
    }

    pub fn default_config(&self, provider_type: &str) -> Option<JsonValue> {
        self.factories
            .get(provider_type)
            .map(|f| f.default_config())
    }

    /// Registry with every built-in provider compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::FixtureGatewayFactory));

        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicGatewayFactory));

        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiGatewayFactory));

        #[cfg(feature = "local")]
        registry.register(Arc::new(super::LocalGatewayFactory));

        registry
    }
}

fn provider_type_of(config: &JsonValue) -> Result<&str, ProviderError> {
    config
        .get("type")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ProviderError::InvalidConfig("missing string field 'type'".to_string()))
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}
