//! Outbound request dispatch.
//!
//! The dispatcher owns the shared HTTP client, identifies the target provider
//! from the request URL, injects the provider credential when the caller has
//! not supplied one, and issues the call. Provider identification keeps the
//! original host-substring rules (`openai.com`, `anthropic.com`, ...), but
//! resolves them once into a [`Provider`] value that the rest of the code
//! matches on.
//!
//! Dispatch is a stateless request/response transform: no retries, no
//! backpressure, and only the client-level timeout. Non-2xx upstream
//! responses are data, not errors - callers receive the provider's status and
//! body verbatim.

use crate::compile::PathSegment;
use crate::config::{ProviderKeys, UpstreamConfig};
use crate::errors::Error;
use crate::registry::ModelRegistry;
use axum::http::StatusCode;
use serde_json::Value;
use std::collections::BTreeMap;

/// Upstream LLM vendor, resolved from the request URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Groq,
    Cohere,
}

impl Provider {
    /// Identify the provider by its literal host substring.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.contains("openai.com") {
            Some(Provider::OpenAi)
        } else if url.contains("anthropic.com") {
            Some(Provider::Anthropic)
        } else if url.contains("groq.com") {
            Some(Provider::Groq)
        } else if url.contains("cohere.ai") {
            Some(Provider::Cohere)
        } else {
            None
        }
    }

    /// Name of the credential header this provider expects.
    pub fn credential_header(&self) -> &'static str {
        match self {
            Provider::Anthropic => "x-api-key",
            Provider::OpenAi | Provider::Groq | Provider::Cohere => "Authorization",
        }
    }

    /// Credential header value for the given API key.
    fn credential_value(&self, key: &str) -> String {
        match self {
            Provider::Anthropic => key.to_string(),
            Provider::OpenAi | Provider::Groq | Provider::Cohere => format!("Bearer {key}"),
        }
    }
}

/// Outcome of the combined auth-injection and input-token count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCharge {
    /// The caller brought their own credential; charged a nominal 1 token
    AlreadyAuthorized,
    /// Unknown provider, unsupported model, or no key configured - do not proceed
    Unsupported,
    /// Credential injected; counted input tokens
    Counted(u64),
}

pub struct Dispatcher {
    client: reqwest::Client,
    keys: ProviderKeys,
}

impl Dispatcher {
    pub fn new(keys: ProviderKeys, upstream: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(upstream.request_timeout)
            .build()?;
        Ok(Self { client, keys })
    }

    fn key_for(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAi => self.keys.openai_api_key.as_deref(),
            Provider::Anthropic => self.keys.anthropic_api_key.as_deref(),
            Provider::Groq => self.keys.groq_api_key.as_deref(),
            Provider::Cohere => self.keys.cohere_api_key.as_deref(),
        }
    }

    /// Inject the provider credential if absent and count the input tokens.
    ///
    /// Callers must treat [`TokenCharge::Unsupported`] as "do not proceed":
    /// either the URL matches no known provider, no key is configured for it,
    /// or the payload names a model outside the registry.
    pub fn authorize_and_count(
        &self,
        registry: &ModelRegistry,
        url: &str,
        headers: &mut BTreeMap<String, String>,
        body: &Value,
    ) -> TokenCharge {
        let Some(provider) = Provider::from_url(url) else {
            return TokenCharge::Unsupported;
        };

        let header = provider.credential_header();
        if headers.keys().any(|name| name.eq_ignore_ascii_case(header)) {
            return TokenCharge::AlreadyAuthorized;
        }

        let Some(key) = self.key_for(provider) else {
            return TokenCharge::Unsupported;
        };
        headers.insert(header.to_string(), provider.credential_value(key));

        match provider {
            Provider::Cohere => {
                // Embedding billing is per input character
                let texts = body.get("texts").unwrap_or(&Value::Null);
                TokenCharge::Counted(crate::tokens::count_characters(texts))
            }
            Provider::OpenAi | Provider::Anthropic | Provider::Groq => {
                let Some(model) = body.get("model").and_then(Value::as_str) else {
                    return TokenCharge::Unsupported;
                };
                if registry.match_provider_model(model).is_none() {
                    return TokenCharge::Unsupported;
                }
                if provider == Provider::OpenAi
                    && model.contains("vision")
                    && !image_parts_are_low_detail(body)
                {
                    return TokenCharge::Unsupported;
                }

                let messages = match body.get("messages").and_then(Value::as_array) {
                    Some(messages) => messages.as_slice(),
                    None => &[],
                };
                TokenCharge::Counted(crate::tokens::estimate(messages))
            }
        }
    }

    /// POST the request and return the provider's status and parsed body.
    ///
    /// Non-2xx responses come back as `(status, body)` without failing; only
    /// transport-level problems (connection, timeout) are errors.
    pub async fn send(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<(StatusCode, Option<Value>), Error> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|err| Error::Internal {
            operation: format!("reach upstream provider: {err}"),
        })?;

        let status =
            StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let text = response.text().await.unwrap_or_default();
        let body = parse_body(text);
        Ok((status, body))
    }

    /// POST the request and hand back the raw response for chunk-wise reading.
    ///
    /// Unlike [`send`](Self::send), a non-2xx status is surfaced as an
    /// [`Error::Upstream`] here, since there is no stream to forward.
    pub async fn send_streaming(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<reqwest::Response, Error> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|err| Error::Internal {
            operation: format!("reach upstream provider: {err}"),
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = parse_body(response.text().await.unwrap_or_default());
            return Err(Error::Upstream { status, body });
        }
        Ok(response)
    }
}

fn parse_body(text: String) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    serde_json::from_str(&text).ok().or(Some(Value::String(text)))
}

/// The low-detail charge only holds for low-resolution images.
fn image_parts_are_low_detail(body: &Value) -> bool {
    let Some(messages) = body.get("messages").and_then(Value::as_array) else {
        return true;
    };
    for message in messages {
        let Some(parts) = message.get("content").and_then(Value::as_array) else {
            continue;
        };
        for part in parts {
            if part.get("type").and_then(Value::as_str) == Some("image_url") {
                let detail = part
                    .get("detail")
                    .or_else(|| part.get("image_url").and_then(|i| i.get("detail")))
                    .and_then(Value::as_str);
                if detail != Some("low") {
                    return false;
                }
            }
        }
    }
    true
}

/// Navigate a provider response along a result path.
pub fn extract<'a>(value: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match segment {
        PathSegment::Key(key) => current.get(key),
        PathSegment::Index(index) => current.get(index),
    })
}

/// Text form of an extracted result fragment.
pub fn fragment_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelRegistry;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher_with_keys() -> Dispatcher {
        Dispatcher::new(
            ProviderKeys {
                openai_api_key: Some("sk-openai".to_string()),
                anthropic_api_key: Some("sk-ant".to_string()),
                groq_api_key: Some("gsk-groq".to_string()),
                cohere_api_key: None,
            },
            &UpstreamConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn providers_resolve_from_host_substrings() {
        assert_eq!(
            Provider::from_url("https://api.openai.com/v1/chat/completions"),
            Some(Provider::OpenAi)
        );
        assert_eq!(
            Provider::from_url("https://api.anthropic.com/v1/messages"),
            Some(Provider::Anthropic)
        );
        assert_eq!(
            Provider::from_url("https://api.groq.com/openai/v1/chat/completions"),
            Some(Provider::Groq)
        );
        assert_eq!(
            Provider::from_url("https://api.cohere.ai/v1/embed"),
            Some(Provider::Cohere)
        );
        assert_eq!(Provider::from_url("https://example.com/v1/chat"), None);
    }

    #[test]
    fn auth_is_injected_when_absent_and_input_counted() {
        let registry = ModelRegistry::builtin();
        let dispatcher = dispatcher_with_keys();
        let mut headers = BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())]);
        let body = json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hello"}]
        });

        let charge = dispatcher.authorize_and_count(
            &registry,
            "https://api.openai.com/v1/chat/completions",
            &mut headers,
            &body,
        );

        assert!(matches!(charge, TokenCharge::Counted(n) if n > 0));
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer sk-openai");
    }

    #[test]
    fn anthropic_uses_the_x_api_key_header() {
        let registry = ModelRegistry::builtin();
        let dispatcher = dispatcher_with_keys();
        let mut headers = BTreeMap::new();
        let body = json!({
            "model": "claude-3-haiku-20240307",
            "messages": [{"role": "user", "content": "hello"}]
        });

        let charge = dispatcher.authorize_and_count(
            &registry,
            "https://api.anthropic.com/v1/messages",
            &mut headers,
            &body,
        );

        assert!(matches!(charge, TokenCharge::Counted(_)));
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-ant");
        assert!(!headers.contains_key("Authorization"));
    }

    #[test]
    fn caller_supplied_auth_is_preserved() {
        let registry = ModelRegistry::builtin();
        let dispatcher = dispatcher_with_keys();
        let mut headers =
            BTreeMap::from([("Authorization".to_string(), "Bearer caller-key".to_string())]);
        let body = json!({"model": "gpt-4", "messages": []});

        let charge = dispatcher.authorize_and_count(
            &registry,
            "https://api.openai.com/v1/chat/completions",
            &mut headers,
            &body,
        );

        assert_eq!(charge, TokenCharge::AlreadyAuthorized);
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer caller-key");
    }

    #[test]
    fn unknown_hosts_models_and_missing_keys_are_unsupported() {
        let registry = ModelRegistry::builtin();
        let dispatcher = dispatcher_with_keys();
        let mut headers = BTreeMap::new();

        // unknown host
        assert_eq!(
            dispatcher.authorize_and_count(
                &registry,
                "https://example.com/v1/chat",
                &mut headers,
                &json!({}),
            ),
            TokenCharge::Unsupported
        );

        // unknown model
        assert_eq!(
            dispatcher.authorize_and_count(
                &registry,
                "https://api.openai.com/v1/chat/completions",
                &mut headers.clone(),
                &json!({"model": "grok-1", "messages": []}),
            ),
            TokenCharge::Unsupported
        );

        // no key configured for the provider
        assert_eq!(
            dispatcher.authorize_and_count(
                &registry,
                "https://api.cohere.ai/v1/embed",
                &mut BTreeMap::new(),
                &json!({"texts": ["hello"]}),
            ),
            TokenCharge::Unsupported
        );
    }

    #[test]
    fn vision_models_require_low_detail_images() {
        let registry = ModelRegistry::builtin();
        let dispatcher = dispatcher_with_keys();
        let body = |detail: &str| {
            json!({
                "model": "gpt-4-vision-preview",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "what is this"},
                        {"type": "image_url", "image_url": {"url": "https://x/cat.png"}, "detail": detail}
                    ]
                }]
            })
        };

        // gpt-4-vision-preview resolves via the gpt-4 prefix
        let high = dispatcher.authorize_and_count(
            &registry,
            "https://api.openai.com/v1/chat/completions",
            &mut BTreeMap::new(),
            &body("high"),
        );
        assert_eq!(high, TokenCharge::Unsupported);

        let low = dispatcher.authorize_and_count(
            &registry,
            "https://api.openai.com/v1/chat/completions",
            &mut BTreeMap::new(),
            &body("low"),
        );
        assert!(matches!(low, TokenCharge::Counted(_)));
    }

    #[tokio::test]
    async fn send_forwards_headers_and_parses_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-openai"))
            .and(body_json(json!({"model": "gpt-4"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "hi there"}}]
            })))
            .mount(&server)
            .await;

        let dispatcher = dispatcher_with_keys();
        let headers =
            BTreeMap::from([("Authorization".to_string(), "Bearer sk-openai".to_string())]);
        let (status, body) = dispatcher
            .send(
                &format!("{}/v1/chat/completions", server.uri()),
                &headers,
                &json!({"model": "gpt-4"}),
            )
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body.unwrap()["choices"][0]["message"]["content"],
            "hi there"
        );
    }

    #[tokio::test]
    async fn send_passes_upstream_errors_through_without_failing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({"error": "rate limited"})),
            )
            .mount(&server)
            .await;

        let dispatcher = dispatcher_with_keys();
        let (status, body) = dispatcher
            .send(&server.uri(), &BTreeMap::new(), &json!({}))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.unwrap()["error"], "rate limited");
    }

    #[tokio::test]
    async fn send_streaming_rejects_non_2xx_with_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let dispatcher = dispatcher_with_keys();
        let err = dispatcher
            .send_streaming(&server.uri(), &BTreeMap::new(), &json!({}))
            .await
            .unwrap_err();

        match err {
            Error::Upstream { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, Some(Value::String("overloaded".to_string())));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn extract_navigates_provider_responses() {
        let openai = json!({"choices": [{"message": {"content": "answer"}}]});
        let path: Vec<PathSegment> =
            serde_json::from_str(r#"["choices", 0, "message", "content"]"#).unwrap();
        assert_eq!(extract(&openai, &path).unwrap(), "answer");

        let anthropic = json!({"content": [{"type": "text", "text": "answer"}]});
        let path: Vec<PathSegment> = serde_json::from_str(r#"["content", 0, "text"]"#).unwrap();
        assert_eq!(extract(&anthropic, &path).unwrap(), "answer");

        assert!(extract(&openai, &[PathSegment::Key("missing".into())]).is_none());
    }
}
