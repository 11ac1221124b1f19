//! Built-in model catalog.
//!
//! One entry per supported model: display metadata, per-1M-token pricing and
//! the raw request template. Templates are JSON documents with the endpoint
//! URL, static headers, a payload skeleton carrying the provider model id,
//! and the `keysToResult` path to the generated text in the provider's
//! response.

use super::{ModelConfig, ModelCost, ModelMetadata, ParameterKind, ParameterSpec};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeMap;

fn system_message() -> (String, ParameterSpec) {
    (
        "system_message".to_string(),
        ParameterSpec {
            kind: ParameterKind::String,
            value: json!("System instructions and context message"),
            minimum: None,
            maximum: None,
            description: "The system message to be used as instructions and context for the conversation".to_string(),
        },
    )
}

fn messages_with_system() -> (String, ParameterSpec) {
    (
        "messages".to_string(),
        ParameterSpec {
            kind: ParameterKind::Array,
            value: json!([
                {
                    "role": "system",
                    "content": "The system message to be used as instructions and context for the conversation"
                },
                { "role": "user", "content": "Hello, how are you?" }
            ]),
            minimum: None,
            maximum: None,
            description: "The messages to be used as input for the conversation alternating between user and assistant".to_string(),
        },
    )
}

fn messages_without_system() -> (String, ParameterSpec) {
    (
        "messages".to_string(),
        ParameterSpec {
            kind: ParameterKind::Array,
            value: json!([{ "role": "user", "content": "Hello, how are you?" }]),
            minimum: None,
            maximum: None,
            description: "The messages to be used as input for the conversation alternating between user and assistant".to_string(),
        },
    )
}

fn temperature() -> (String, ParameterSpec) {
    (
        "temperature".to_string(),
        ParameterSpec {
            kind: ParameterKind::Number,
            value: json!(0.7),
            minimum: Some(0.0),
            maximum: Some(2.0),
            description: "The temperature of the sampling distribution. Lower temperatures make the model more deterministic, and higher temperatures make the model more random.".to_string(),
        },
    )
}

fn top_k() -> (String, ParameterSpec) {
    (
        "top_k".to_string(),
        ParameterSpec {
            kind: ParameterKind::Number,
            value: json!(1.0),
            minimum: Some(0.0),
            maximum: Some(1.0),
            description: "The number of highest probability vocabulary tokens to keep for top-k sampling. Higher values make the model more deterministic.".to_string(),
        },
    )
}

fn top_p() -> (String, ParameterSpec) {
    (
        "top_p".to_string(),
        ParameterSpec {
            kind: ParameterKind::Number,
            value: json!(1.0),
            minimum: Some(0.0),
            maximum: Some(1.0),
            description: "The cumulative probability of the top tokens to sample from. Lower values make the model more deterministic and higher values make the model more random.".to_string(),
        },
    )
}

fn presence_penalty() -> (String, ParameterSpec) {
    (
        "presence_penalty".to_string(),
        ParameterSpec {
            kind: ParameterKind::Number,
            value: json!(0.0),
            minimum: Some(-2.0),
            maximum: Some(2.0),
            description: "The penalty for adding tokens that were already in the prompt. Higher values make the model less likely to repeat tokens.".to_string(),
        },
    )
}

fn frequency_penalty() -> (String, ParameterSpec) {
    (
        "frequency_penalty".to_string(),
        ParameterSpec {
            kind: ParameterKind::Number,
            value: json!(0.0),
            minimum: Some(-2.0),
            maximum: Some(2.0),
            description: "The penalty for adding tokens that have appeared frequently in the past. Higher values make the model less likely to use repeated words.".to_string(),
        },
    )
}

fn response_format() -> (String, ParameterSpec) {
    (
        "response_format".to_string(),
        ParameterSpec {
            kind: ParameterKind::String,
            value: json!("text"),
            minimum: None,
            maximum: None,
            description: "The format of the response. Can be 'text' or 'json_object'.".to_string(),
        },
    )
}

fn max_tokens(maximum: f64) -> (String, ParameterSpec) {
    (
        "max_tokens".to_string(),
        ParameterSpec {
            kind: ParameterKind::Number,
            value: json!(200),
            minimum: Some(1.0),
            maximum: Some(maximum),
            description: "The maximum number of tokens to generate in the response".to_string(),
        },
    )
}

/// Parameter set shared by the Anthropic messages API models.
fn anthropic_parameters() -> BTreeMap<String, ParameterSpec> {
    BTreeMap::from([
        system_message(),
        messages_without_system(),
        temperature(),
        top_p(),
        top_k(),
        max_tokens(2048.0),
    ])
}

/// Parameter set shared by the OpenAI chat completion models.
fn openai_parameters() -> BTreeMap<String, ParameterSpec> {
    BTreeMap::from([
        messages_with_system(),
        temperature(),
        top_p(),
        presence_penalty(),
        frequency_penalty(),
        max_tokens(2048.0),
    ])
}

/// Parameter set shared by the Groq-hosted open models.
fn groq_parameters() -> BTreeMap<String, ParameterSpec> {
    BTreeMap::from([
        messages_with_system(),
        temperature(),
        top_p(),
        frequency_penalty(),
        presence_penalty(),
        response_format(),
        max_tokens(8192.0),
    ])
}

fn metadata(
    name: &str,
    provider: &str,
    developer: &str,
    description: &str,
    input: Decimal,
    output: Decimal,
    tokens_per_seconds: Option<&str>,
) -> ModelMetadata {
    ModelMetadata {
        name: name.to_string(),
        provider: provider.to_string(),
        developer: developer.to_string(),
        description: description.to_string(),
        cost: ModelCost { input, output },
        tokens_per_seconds: tokens_per_seconds.map(str::to_string),
    }
}

pub(super) fn builtin() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new(
            metadata(
                "Claude 2.1",
                "Anthropic",
                "Anthropic",
                "An updated version of Claude 2 with improved accuracy and consistency",
                Decimal::new(8, 0),
                Decimal::new(24, 0),
                None,
            ),
            r#"{
              "url": "https://api.anthropic.com/v1/messages",
              "headers": {
                "anthropic-version": "2023-06-01",
                "Content-Type": "application/json"
              },
              "payload": {
                "model": "claude-2.1"
              },
              "keysToResult": ["content", 0, "text"]
            }"#,
            anthropic_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "Claude 3 Haiku",
                "Anthropic",
                "Anthropic",
                "Haiku is the fastest and most cost-effective model for its intelligence category from the Anthropic family of models.",
                Decimal::new(25, 2),
                Decimal::new(125, 2),
                None,
            ),
            r#"{
              "url": "https://api.anthropic.com/v1/messages",
              "headers": {
                "anthropic-version": "2023-06-01",
                "Content-Type": "application/json"
              },
              "payload": {
                "model": "claude-3-haiku-20240307"
              },
              "keysToResult": ["content", 0, "text"]
            }"#,
            anthropic_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "Claude 3 Opus",
                "Anthropic",
                "Anthropic",
                "Opus is the most powerful, delivering state-of-the-art performance on complex tasks from the Anthropic family of models.",
                Decimal::new(15, 0),
                Decimal::new(75, 0),
                None,
            ),
            r#"{
              "url": "https://api.anthropic.com/v1/messages",
              "headers": {
                "anthropic-version": "2023-06-01",
                "Content-Type": "application/json"
              },
              "payload": {
                "model": "claude-3-opus-20240229"
              },
              "keysToResult": ["content", 0, "text"]
            }"#,
            anthropic_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "Claude 3 Sonnet",
                "Anthropic",
                "Anthropic",
                "Ideal balance of intelligence and speed for enterprise workloads.",
                Decimal::new(3, 0),
                Decimal::new(15, 0),
                None,
            ),
            r#"{
              "url": "https://api.anthropic.com/v1/messages",
              "headers": {
                "anthropic-version": "2023-06-01",
                "Content-Type": "application/json"
              },
              "payload": {
                "model": "claude-3-sonnet-20240229"
              },
              "keysToResult": ["content", 0, "text"]
            }"#,
            anthropic_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "Claude 3.5 Sonnet",
                "Anthropic",
                "Anthropic",
                "Most intelligent model",
                Decimal::new(3, 0),
                Decimal::new(15, 0),
                None,
            ),
            r#"{
              "url": "https://api.anthropic.com/v1/messages",
              "headers": {
                "anthropic-version": "2023-06-01",
                "Content-Type": "application/json"
              },
              "payload": {
                "model": "claude-3-5-sonnet-20240620"
              },
              "keysToResult": ["content", 0, "text"]
            }"#,
            anthropic_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "GPT 3.5 Turbo",
                "OpenAI",
                "OpenAI",
                "A fast and powerful model for generating text",
                Decimal::new(5, 1),
                Decimal::new(15, 1),
                None,
            ),
            r#"{
              "url": "https://api.openai.com/v1/chat/completions",
              "headers": {
                "Content-Type": "application/json"
              },
              "payload": {
                "model": "gpt-3.5-turbo"
              },
              "keysToResult": ["choices", 0, "message", "content"]
            }"#,
            openai_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "GPT4",
                "OpenAI",
                "OpenAI",
                "A fast and powerful model for generating text",
                Decimal::new(30, 0),
                Decimal::new(60, 0),
                None,
            ),
            r#"{
              "url": "https://api.openai.com/v1/chat/completions",
              "method": "POST",
              "headers": {
                "Content-Type": "application/json"
              },
              "payload": {
                "model": "gpt-4"
              },
              "keysToResult": ["choices", 0, "message", "content"]
            }"#,
            openai_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "Llama 3.3 70B Versatile",
                "Groq",
                "Meta",
                "A versatile model with a large context window for complex tasks.",
                Decimal::new(59, 2),
                Decimal::new(79, 2),
                Some("250"),
            ),
            r#"{
              "url": "https://api.groq.com/openai/v1/chat/completions",
              "method": "POST",
              "headers": { "Content-Type": "application/json" },
              "payload": {
                "model": "llama-3.3-70b-versatile"
              },
              "keysToResult": ["choices", 0, "message", "content"]
            }"#,
            groq_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "Llama3-70b",
                "Groq",
                "Meta",
                "An extremely fast and powerful model for generating text",
                Decimal::new(59, 2),
                Decimal::new(79, 2),
                None,
            ),
            r#"{
              "url": "https://api.groq.com/openai/v1/chat/completions",
              "method": "POST",
              "headers": { "Content-Type": "application/json" },
              "payload": {
                "model": "llama3-70b-8192"
              },
              "keysToResult": ["choices", 0, "message", "content"]
            }"#,
            groq_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "Gemma 2 9B",
                "Groq",
                "Google",
                "An extremely fast and powerful model for generating text",
                Decimal::new(2, 1),
                Decimal::new(2, 1),
                None,
            ),
            r#"{
              "url": "https://api.groq.com/openai/v1/chat/completions",
              "method": "POST",
              "headers": { "Content-Type": "application/json" },
              "payload": {
                "model": "gemma2-9b-it"
              },
              "keysToResult": ["choices", 0, "message", "content"]
            }"#,
            groq_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "Llama 3.3 8B Instant",
                "Groq",
                "Meta",
                "An instant response model ideal for quick interactions.",
                Decimal::new(5, 2),
                Decimal::new(8, 2),
                Some("750"),
            ),
            r#"{
              "url": "https://api.groq.com/openai/v1/chat/completions",
              "method": "POST",
              "headers": { "Content-Type": "application/json" },
              "payload": {
                "model": "llama-3.3-8b-instant"
              },
              "keysToResult": ["choices", 0, "message", "content"]
            }"#,
            groq_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "Gemma 7B",
                "Groq",
                "Google",
                "A smaller but efficient model for generating quick and coherent text.",
                Decimal::new(7, 2),
                Decimal::new(7, 2),
                Some("950"),
            ),
            r#"{
              "url": "https://api.groq.com/openai/v1/chat/completions",
              "method": "POST",
              "headers": { "Content-Type": "application/json" },
              "payload": {
                "model": "gemma-7b-it"
              },
              "keysToResult": ["choices", 0, "message", "content"]
            }"#,
            groq_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "Mixtral 8x7B",
                "Groq",
                "Mistral",
                "An instruct model with a large context window for detailed outputs.",
                Decimal::new(24, 2),
                Decimal::new(24, 2),
                Some("575"),
            ),
            r#"{
              "url": "https://api.groq.com/openai/v1/chat/completions",
              "method": "POST",
              "headers": { "Content-Type": "application/json" },
              "payload": {
                "model": "mixtral-8x7b-32768"
              },
              "keysToResult": ["choices", 0, "message", "content"]
            }"#,
            groq_parameters(),
        ),
        ModelConfig::new(
            metadata(
                "Llama Guard 3 8B",
                "Groq",
                "Meta",
                "A secure and reliable model designed for guard-rail purposes.",
                Decimal::new(2, 1),
                Decimal::new(2, 1),
                Some("765"),
            ),
            r#"{
              "url": "https://api.groq.com/openai/v1/chat/completions",
              "method": "POST",
              "headers": { "Content-Type": "application/json" },
              "payload": {
                "model": "llama-guard-3-8b"
              },
              "keysToResult": ["choices", 0, "message", "content"]
            }"#,
            groq_parameters(),
        ),
    ]
}
