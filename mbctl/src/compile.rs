//! Request compilation: model template + caller parameters -> request descriptor.
//!
//! A model's request template is a JSON document naming the provider endpoint,
//! static headers, a payload skeleton (carrying the provider model id) and the
//! path to the generated text in the provider's response. Compilation parses
//! the template and merges the caller's parameters into the payload as typed
//! JSON values, so multi-line text or embedded quotes in parameter values
//! cannot corrupt the request.

use crate::errors::Error;
use crate::registry::ModelRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One step of a result path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

/// Parsed shape of a model's raw request template.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestTemplate {
    pub url: String,
    /// Request method; templates only describe POST endpoints today
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub payload: Map<String, Value>,
    #[serde(rename = "keysToResult")]
    pub keys_to_result: Vec<PathSegment>,
}

/// Everything needed to issue one provider request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestDescriptor {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub payload: Value,
    pub result_path: Vec<PathSegment>,
}

/// Compile a request for `model_name`.
///
/// The payload is the template skeleton plus, for every declared parameter,
/// the caller's value (or the declared default when unset). Callers may pass
/// parameters beyond the declared set; they are merged verbatim. When
/// `inputs` is given, `{{ field }}` tokens inside string values of the
/// parameters are interpolated first.
pub fn compile(
    registry: &ModelRegistry,
    model_name: &str,
    parameters: &Map<String, Value>,
    inputs: Option<&Map<String, Value>>,
) -> Result<RequestDescriptor, Error> {
    let config = registry.lookup(model_name)?;

    let template: RequestTemplate =
        serde_json::from_str(config.request).map_err(|err| Error::TemplateCompilation {
            model: model_name.to_string(),
            detail: format!("{err}; template: {}", config.request),
        })?;

    let mut payload = template.payload;

    // Declared parameters first, falling back to their spec defaults
    for (name, spec) in &config.payload_parameters {
        let value = parameters
            .get(name)
            .cloned()
            .unwrap_or_else(|| spec.value.clone());
        payload.insert(name.clone(), apply_inputs(value, inputs));
    }

    // Then anything extra the caller supplied
    for (name, value) in parameters {
        if !payload.contains_key(name) {
            payload.insert(name.clone(), apply_inputs(value.clone(), inputs));
        }
    }

    Ok(RequestDescriptor {
        url: template.url,
        headers: template.headers,
        payload: Value::Object(payload),
        result_path: template.keys_to_result,
    })
}

fn apply_inputs(value: Value, inputs: Option<&Map<String, Value>>) -> Value {
    match inputs {
        Some(inputs) if !inputs.is_empty() => interpolate(value, inputs),
        _ => value,
    }
}

/// Replace `{{ field }}` tokens in string leaves with the matching input value.
fn interpolate(value: Value, inputs: &Map<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate_str(&s, inputs)),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| interpolate(v, inputs)).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, interpolate(v, inputs)))
                .collect(),
        ),
        other => other,
    }
}

fn interpolate_str(text: &str, inputs: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);

        let token = rest[start + 2..start + 2 + end].trim();
        match inputs.get(token) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            // Unknown fields render as empty, as a template engine would
            None => {}
        }

        rest = &rest[start + 2 + end + 2..];
    }
    out.push_str(rest);
    out
}
