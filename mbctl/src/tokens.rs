//! Token and cost estimation.
//!
//! Input sizes are approximated with the cl100k_base BPE, the tokenizer used
//! by the chat models this service fronts. Messages carry either a plain
//! string `content` or a list of typed parts; image parts are charged a fixed
//! low-resolution rate rather than tokenized. The estimate is deterministic
//! for a fixed input and never fails - malformed messages simply contribute
//! nothing.

use crate::registry::ModelRegistry;
use rust_decimal::Decimal;
use serde_json::Value;

/// Fixed charge for a low-resolution image part.
const IMAGE_TOKENS_LOW_DETAIL: u64 = 85;

/// Approximate the input token count of a chat message array.
///
/// Returns 0 for empty or unrecognized input.
pub fn estimate(messages: &[Value]) -> u64 {
    let bpe = tiktoken_rs::cl100k_base_singleton();

    let mut total = 0u64;
    for message in messages {
        match message.get("content") {
            Some(Value::String(text)) => {
                total += bpe.encode_with_special_tokens(text).len() as u64;
            }
            Some(Value::Array(parts)) => {
                for part in parts {
                    match part.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            // Some producers put the text under `text`, others
                            // under `content`; accept both.
                            if let Some(text) = part
                                .get("text")
                                .or_else(|| part.get("content"))
                                .and_then(Value::as_str)
                            {
                                total += bpe.encode_with_special_tokens(text).len() as u64;
                            }
                        }
                        Some("image_url") => total += IMAGE_TOKENS_LOW_DETAIL,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    total
}

/// Character count of an embedding input, which providers bill per character
/// equivalent rather than per BPE token.
pub fn count_characters(texts: &Value) -> u64 {
    match texts {
        Value::String(s) => s.len() as u64,
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.len() as u64)
            .sum(),
        _ => 0,
    }
}

/// Dollar cost estimate at the registry's static per-1M-token pricing.
///
/// `model` may be a display name ("GPT4") or a provider model id ("gpt-4",
/// including dated variants). `None` means the model is unsupported and the
/// caller must not proceed with a billable request.
pub fn cost_estimate(
    registry: &ModelRegistry,
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
) -> Option<Decimal> {
    let config = registry
        .lookup(model)
        .ok()
        .or_else(|| registry.match_provider_model(model))?;
    Some(config.cost(input_tokens, output_tokens))
}
