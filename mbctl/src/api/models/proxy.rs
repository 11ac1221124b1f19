//! Request/response shapes for the proxy and invoke endpoints.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Body of `POST /proxy`: a caller-built provider request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProxyRequest {
    /// Full provider URL; the provider is identified from its host
    pub url: String,
    pub options: ProxyOptions,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProxyOptions {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub body: Value,
}

/// Body of `POST /models/{model_name}/invoke`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InvokeRequest {
    /// Payload parameters merged into the model's request template
    #[schema(value_type = Object)]
    pub parameters: Map<String, Value>,
    /// Input fields interpolated into `{{ field }}` tokens of the parameters
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub inputs: Option<Map<String, Value>>,
}
