//! Immutable model registry.
//!
//! The registry is the process-wide table of supported models: display
//! metadata, per-1M-token pricing, the raw request template (endpoint URL,
//! static headers, payload skeleton, result path) and the payload parameter
//! specs. It is constructed once at startup from the built-in catalog and
//! passed explicitly to the components that need it; there is no mutation
//! API - updating the table means redeploying.

mod catalog;

use crate::errors::Error;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Per-1M-token dollar pricing. Serialized as decimal strings to avoid
/// floating point drift in billing-relevant numbers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelCost {
    #[schema(value_type = String)]
    pub input: Decimal,
    #[schema(value_type = String)]
    pub output: Decimal,
}

/// Display metadata for one model, exposed to clients as-is.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub name: String,
    pub provider: String,
    pub developer: String,
    pub description: String,
    pub cost: ModelCost,
    /// Advertised throughput, where the provider publishes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_seconds: Option<String>,
}

/// Value kind of a payload parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
    Array,
}

/// Declared spec for one payload parameter: type, default, bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    /// Default used when the caller leaves the parameter unset
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    pub description: String,
}

/// Static configuration for one model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub metadata: ModelMetadata,
    /// Raw request template: a JSON document with `url`, `headers`, a
    /// `payload` skeleton carrying the provider model id, and `keysToResult`.
    pub request: &'static str,
    pub payload_parameters: BTreeMap<String, ParameterSpec>,
    /// Provider model id extracted from the template payload (best effort)
    pub provider_model_id: Option<String>,
}

impl ModelConfig {
    fn new(
        metadata: ModelMetadata,
        request: &'static str,
        payload_parameters: BTreeMap<String, ParameterSpec>,
    ) -> Self {
        let provider_model_id = serde_json::from_str::<Value>(request)
            .ok()
            .and_then(|v| v["payload"]["model"].as_str().map(str::to_string));

        Self {
            metadata,
            request,
            payload_parameters,
            provider_model_id,
        }
    }

    /// Dollar cost for the given token counts, at this model's per-1M pricing.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> Decimal {
        let per_million = Decimal::from(1_000_000u64);
        (Decimal::from(input_tokens) * self.metadata.cost.input
            + Decimal::from(output_tokens) * self.metadata.cost.output)
            / per_million
    }
}

/// Read-only map of model display name to configuration.
#[derive(Debug)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelConfig>,
}

impl ModelRegistry {
    /// Build the registry from the built-in catalog.
    pub fn builtin() -> Self {
        let models = catalog::builtin()
            .into_iter()
            .map(|config| (config.metadata.name.clone(), config))
            .collect();
        Self { models }
    }

    /// Look up a model by its display name ("GPT4", "Claude 3.5 Sonnet", ...).
    pub fn lookup(&self, name: &str) -> Result<&ModelConfig, Error> {
        self.models.get(name).ok_or_else(|| Error::ModelNotFound {
            name: name.to_string(),
        })
    }

    /// Iterate configured display names in stable order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Display name -> metadata map, as attached to project responses.
    pub fn metadata(&self) -> BTreeMap<String, ModelMetadata> {
        self.models
            .iter()
            .map(|(name, config)| (name.clone(), config.metadata.clone()))
            .collect()
    }

    /// Find the model whose provider model id is a prefix of `model_id`.
    ///
    /// Providers version their ids ("gpt-4" vs "gpt-4-0613"), so incoming ids
    /// are matched by prefix; the longest configured prefix wins.
    pub fn match_provider_model(&self, model_id: &str) -> Option<&ModelConfig> {
        self.models
            .values()
            .filter(|config| {
                config
                    .provider_model_id
                    .as_deref()
                    .is_some_and(|id| model_id.starts_with(id))
            })
            .max_by_key(|config| {
                config
                    .provider_model_id
                    .as_deref()
                    .map(str::len)
                    .unwrap_or(0)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_complete() {
        let registry = ModelRegistry::builtin();
        for name in [
            "Claude 2.1",
            "Claude 3 Haiku",
            "Claude 3 Opus",
            "Claude 3 Sonnet",
            "Claude 3.5 Sonnet",
            "GPT 3.5 Turbo",
            "GPT4",
            "Llama 3.3 70B Versatile",
            "Llama3-70b",
            "Gemma 2 9B",
            "Llama 3.3 8B Instant",
            "Gemma 7B",
            "Mixtral 8x7B",
            "Llama Guard 3 8B",
        ] {
            assert!(registry.lookup(name).is_ok(), "missing {name}");
        }
        assert_eq!(registry.len(), 14);
    }

    #[test]
    fn every_template_parses_and_carries_a_model_id() {
        let registry = ModelRegistry::builtin();
        for name in registry.names().collect::<Vec<_>>() {
            let config = registry.lookup(name).unwrap();
            let template: Value =
                serde_json::from_str(config.request).expect("template should be valid JSON");
            assert!(template["url"].is_string(), "{name} has no url");
            assert!(
                template["keysToResult"].is_array(),
                "{name} has no result path"
            );
            assert!(
                config.provider_model_id.is_some(),
                "{name} has no provider model id"
            );
        }
    }

    #[test]
    fn unknown_model_is_rejected() {
        let registry = ModelRegistry::builtin();
        assert!(matches!(
            registry.lookup("GPT 17"),
            Err(Error::ModelNotFound { .. })
        ));
    }

    #[test]
    fn provider_model_ids_match_by_prefix() {
        let registry = ModelRegistry::builtin();

        let exact = registry.match_provider_model("gpt-4").unwrap();
        assert_eq!(exact.metadata.name, "GPT4");

        // a dated variant still resolves to the configured prefix
        let dated = registry.match_provider_model("gpt-4-0613").unwrap();
        assert_eq!(dated.metadata.name, "GPT4");

        assert!(registry.match_provider_model("grok-1").is_none());
    }

    #[test]
    fn cost_scales_per_million_tokens() {
        let registry = ModelRegistry::builtin();
        let gpt4 = registry.lookup("GPT4").unwrap();
        // 30 in / 60 out per 1M tokens
        let cost = gpt4.cost(1_000_000, 1_000_000);
        assert_eq!(cost, Decimal::from(90));
        let zero = gpt4.cost(0, 0);
        assert_eq!(zero, Decimal::ZERO);
    }
}
