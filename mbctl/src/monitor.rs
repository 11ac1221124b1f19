//! Offline API monitoring tool.
//!
//! Runs a fixed battery of realistic prompt scenarios against the configured
//! chat model, recording latency, token usage and response-quality signals
//! (finish reason, refusals, average logprob) for each prompt. Every scenario
//! is fired as its own task and all results are collected together - task
//! failures become failure records rather than aborting the run. The records
//! are appended to an S3 object as JSON Lines so successive runs build a time
//! series.

use crate::config::MonitorSettings;
use crate::errors::Error;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Instant;
use utoipa::ToSchema;

/// One prompt scenario in the battery.
#[derive(Debug, Clone)]
pub struct PromptScenario {
    pub id: &'static str,
    pub category: &'static str,
    pub messages: Value,
}

/// The prompt battery: short, medium and long system instructions, covering
/// the request shapes real applications send.
pub fn battery() -> Vec<PromptScenario> {
    vec![
        PromptScenario {
            id: "customer-greeting",
            category: "short",
            messages: json!([
                {
                    "role": "system",
                    "content": "You are a helpful customer service representative for TechCorp. Be friendly and professional."
                },
                { "role": "user", "content": "Hi, I need help with my account login" }
            ]),
        },
        PromptScenario {
            id: "math-helper",
            category: "short",
            messages: json!([
                {
                    "role": "system",
                    "content": "You are a math tutor. Show your work step by step and explain concepts clearly."
                },
                { "role": "user", "content": "What's 15% of 240?" }
            ]),
        },
        PromptScenario {
            id: "financial-advisor",
            category: "medium",
            messages: json!([
                {
                    "role": "system",
                    "content": "You are a certified financial advisor with 10+ years of experience. You help clients make informed investment decisions based on their risk tolerance, time horizon, and financial goals. Always remind users that this is educational information and not personalized financial advice. Consider market conditions, diversification principles, and long-term wealth building strategies. Be clear about potential risks and never guarantee returns."
                },
                {
                    "role": "user",
                    "content": "I'm 28 years old with $50k saved. Should I invest in index funds or individual stocks for retirement? I'm comfortable with moderate risk."
                }
            ]),
        },
        PromptScenario {
            id: "code-architect",
            category: "medium",
            messages: json!([
                {
                    "role": "system",
                    "content": "You are a senior software architect reviewing system designs. Evaluate proposals for scalability, maintainability, and operational complexity. Point out failure modes the author may have missed, and suggest simpler alternatives where the design is over-engineered. Keep feedback specific and actionable."
                },
                {
                    "role": "user",
                    "content": "We want to split our monolith into 40 microservices so each team owns one endpoint. Thoughts?"
                }
            ]),
        },
        PromptScenario {
            id: "contract-reviewer",
            category: "long",
            messages: json!([
                {
                    "role": "system",
                    "content": "You are a legal analyst specializing in commercial contracts. When reviewing contract language, identify: (1) obligations imposed on each party, (2) termination and renewal conditions, (3) liability caps and indemnification clauses, (4) ambiguous language that could be interpreted against either party, and (5) missing protections a reasonable counterparty would expect. Structure your analysis under those five headings. Always note that your analysis is informational and not legal advice, and recommend consulting a licensed attorney for binding interpretation. Be precise about which clause numbers you reference and quote the operative language before analyzing it."
                },
                {
                    "role": "user",
                    "content": "Review this clause: 'Either party may terminate this Agreement at any time, with or without cause, upon written notice. Upon termination, all fees paid are non-refundable and Customer shall remain liable for all fees for the remainder of the then-current term.'"
                }
            ]),
        },
        PromptScenario {
            id: "lesson-planner",
            category: "long",
            messages: json!([
                {
                    "role": "system",
                    "content": "You are an experienced curriculum designer for secondary education. When asked to plan a lesson, produce: learning objectives aligned to measurable outcomes, a warm-up activity under five minutes, a main activity with differentiation for advanced and struggling students, formative assessment checkpoints, required materials, and a homework assignment that reinforces the objective without requiring more than twenty minutes. Keep the tone practical and classroom-tested, assume a 50-minute period, and flag any activity that depends on technology with a no-tech fallback."
                },
                {
                    "role": "user",
                    "content": "Plan a lesson introducing the Pythagorean theorem to 8th graders."
                }
            ]),
        },
    ]
}

/// One monitoring observation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorRecord {
    pub timestamp: DateTime<Utc>,
    pub prompt_id: String,
    pub category: String,
    pub model: String,
    pub latency_ms: u64,
    pub success: bool,
    pub finish_reason: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
    pub reasoning_tokens: u64,
    pub response_length: u64,
    pub response: String,
    pub has_refusal: bool,
    pub avg_logprob: Option<f64>,
    pub service_tier: String,
    pub response_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-category aggregate.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub total: u64,
    pub successful: u64,
    pub avg_latency: u64,
}

/// Aggregate over one monitoring run.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSummary {
    pub total_prompts: u64,
    pub successful: u64,
    pub failed: u64,
    /// Percentage of prompts that succeeded, rounded
    pub success_rate: u64,
    pub avg_latency: u64,
    pub total_tokens: u64,
    pub category_breakdown: BTreeMap<String, CategoryStats>,
}

/// Aggregate a batch of records into a run summary.
pub fn summarize(records: &[MonitorRecord]) -> MonitorSummary {
    let successful: Vec<&MonitorRecord> = records.iter().filter(|r| r.success).collect();
    let failed = records.len() - successful.len();

    let avg_latency = if successful.is_empty() {
        0
    } else {
        successful.iter().map(|r| r.latency_ms).sum::<u64>() / successful.len() as u64
    };
    let success_rate = if records.is_empty() {
        0
    } else {
        ((successful.len() as f64 / records.len() as f64) * 100.0).round() as u64
    };

    let mut category_breakdown: BTreeMap<String, CategoryStats> = BTreeMap::new();
    for record in records {
        let stats = category_breakdown.entry(record.category.clone()).or_default();
        stats.total += 1;
        if record.success {
            // running average over the successful observations
            stats.avg_latency =
                (stats.avg_latency * stats.successful + record.latency_ms) / (stats.successful + 1);
            stats.successful += 1;
        }
    }

    MonitorSummary {
        total_prompts: records.len() as u64,
        successful: successful.len() as u64,
        failed: failed as u64,
        success_rate,
        avg_latency,
        total_tokens: successful.iter().map(|r| r.total_tokens).sum(),
        category_breakdown,
    }
}

/// Mean logprob of the response tokens, rounded to 3 decimal places.
fn average_logprob(logprobs: &Value) -> Option<f64> {
    let content = logprobs.get("content")?.as_array()?;
    let values: Vec<f64> = content
        .iter()
        .filter_map(|token| token.get("logprob").and_then(Value::as_f64))
        .collect();
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some((mean * 1000.0).round() / 1000.0)
}

#[derive(Clone)]
pub struct ApiMonitor {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    object_key: String,
    s3: Option<(aws_sdk_s3::Client, String)>,
}

impl ApiMonitor {
    pub fn new(
        settings: &MonitorSettings,
        api_key: Option<String>,
        s3: Option<aws_sdk_s3::Client>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        let s3 = match (&settings.bucket, s3) {
            (Some(bucket), Some(client)) => Some((client, bucket.clone())),
            _ => None,
        };
        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            object_key: settings.object_key.clone(),
            s3,
        })
    }

    /// Run the full battery once, persist the records and return the summary.
    pub async fn run_once(&self) -> Result<MonitorSummary, Error> {
        let handles: Vec<_> = battery()
            .into_iter()
            .map(|scenario| {
                let monitor = self.clone();
                let id = scenario.id;
                let category = scenario.category;
                (
                    id,
                    category,
                    tokio::spawn(async move { monitor.execute_prompt(&scenario).await }),
                )
            })
            .collect();

        let mut records = Vec::with_capacity(handles.len());
        for (id, category, handle) in handles {
            match handle.await {
                Ok(record) => records.push(record),
                Err(err) => {
                    records.push(self.failure_record(id, category, format!("task failed: {err}"), 0))
                }
            }
        }

        self.append_history(&records)
            .await
            .map_err(|err| Error::Internal {
                operation: format!("save monitoring history: {err:#}"),
            })?;

        Ok(summarize(&records))
    }

    async fn execute_prompt(&self, scenario: &PromptScenario) -> MonitorRecord {
        let started = Instant::now();
        let url = format!("{}/chat/completions", self.api_base);

        let mut request = self.client.post(&url).json(&json!({
            "model": self.model,
            "messages": scenario.messages,
            "logprobs": true,
            // top-5 alternatives for quality analysis
            "top_logprobs": 5
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let elapsed = |started: Instant| started.elapsed().as_millis() as u64;

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                return self.failure_record(
                    scenario.id,
                    scenario.category,
                    err.to_string(),
                    elapsed(started),
                );
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return self.failure_record(
                scenario.id,
                scenario.category,
                format!("API error: {status}"),
                elapsed(started),
            );
        }

        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(err) => {
                return self.failure_record(
                    scenario.id,
                    scenario.category,
                    format!("malformed response: {err}"),
                    elapsed(started),
                );
            }
        };

        self.format_result(scenario, &data, elapsed(started))
    }

    fn format_result(
        &self,
        scenario: &PromptScenario,
        data: &Value,
        latency_ms: u64,
    ) -> MonitorRecord {
        let choice = &data["choices"][0];
        let usage = &data["usage"];
        let counter = |v: &Value| v.as_u64().unwrap_or(0);
        let content = choice["message"]["content"].as_str().unwrap_or_default();
        let refusal = choice["message"]["refusal"].as_str();

        MonitorRecord {
            timestamp: Utc::now(),
            prompt_id: scenario.id.to_string(),
            category: scenario.category.to_string(),
            model: data["model"].as_str().unwrap_or(&self.model).to_string(),
            latency_ms,
            success: true,
            finish_reason: choice["finish_reason"].as_str().unwrap_or("unknown").to_string(),
            prompt_tokens: counter(&usage["prompt_tokens"]),
            completion_tokens: counter(&usage["completion_tokens"]),
            total_tokens: counter(&usage["total_tokens"]),
            cached_tokens: counter(&usage["prompt_tokens_details"]["cached_tokens"]),
            reasoning_tokens: counter(&usage["completion_tokens_details"]["reasoning_tokens"]),
            response_length: content.len() as u64,
            response: content.to_string(),
            has_refusal: refusal.is_some(),
            avg_logprob: average_logprob(&choice["logprobs"]),
            service_tier: data["service_tier"].as_str().unwrap_or("unknown").to_string(),
            response_id: data["id"].as_str().map(str::to_string),
            error: None,
        }
    }

    fn failure_record(
        &self,
        prompt_id: &str,
        category: &str,
        error: String,
        latency_ms: u64,
    ) -> MonitorRecord {
        MonitorRecord {
            timestamp: Utc::now(),
            prompt_id: prompt_id.to_string(),
            category: category.to_string(),
            model: self.model.clone(),
            latency_ms,
            success: false,
            finish_reason: "error".to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cached_tokens: 0,
            reasoning_tokens: 0,
            response_length: 0,
            response: String::new(),
            has_refusal: false,
            avg_logprob: None,
            service_tier: "unknown".to_string(),
            response_id: None,
            error: Some(error),
        }
    }

    /// Append the run's records to the JSONL history object.
    ///
    /// A missing object is an empty history; persistence is skipped entirely
    /// when no bucket is configured.
    async fn append_history(&self, records: &[MonitorRecord]) -> anyhow::Result<()> {
        let Some((s3, bucket)) = &self.s3 else {
            return Ok(());
        };

        let mut history = match s3
            .get_object()
            .bucket(bucket)
            .key(&self.object_key)
            .send()
            .await
        {
            Ok(out) => {
                let bytes = out.body.collect().await.context("read history body")?;
                String::from_utf8_lossy(&bytes.into_bytes()).into_owned()
            }
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => String::new(),
            Err(err) => return Err(err).context("load history object"),
        };

        for record in records {
            history.push_str(&serde_json::to_string(record).context("serialize record")?);
            history.push('\n');
        }

        s3.put_object()
            .bucket(bucket)
            .key(&self.object_key)
            .content_type("application/x-ndjson")
            .body(aws_sdk_s3::primitives::ByteStream::from(
                history.into_bytes(),
            ))
            .send()
            .await
            .context("write history object")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn monitor_against(base: &str) -> ApiMonitor {
        ApiMonitor::new(
            &MonitorSettings {
                model: "gpt-4o-mini".to_string(),
                api_base: base.to_string(),
                bucket: None,
                object_key: "monitor_data.jsonl".to_string(),
            },
            Some("sk-test".to_string()),
            None,
        )
        .unwrap()
    }

    #[test]
    fn battery_covers_all_categories() {
        let scenarios = battery();
        for category in ["short", "medium", "long"] {
            assert!(
                scenarios.iter().any(|s| s.category == category),
                "missing {category} scenarios"
            );
        }
        // ids are unique
        let mut ids: Vec<_> = scenarios.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), scenarios.len());
    }

    #[test]
    fn average_logprob_rounds_to_three_places() {
        let logprobs = json!({
            "content": [
                {"logprob": -0.1}, {"logprob": -0.2}, {"logprob": -0.4}
            ]
        });
        assert_eq!(average_logprob(&logprobs), Some(-0.233));
        assert_eq!(average_logprob(&json!({"content": []})), None);
        assert_eq!(average_logprob(&Value::Null), None);
    }

    #[test]
    fn summary_aggregates_by_category() {
        let monitor = monitor_against("http://unused");
        let mut records = vec![
            monitor.failure_record("a", "short", "boom".to_string(), 10),
        ];
        let mut ok = monitor.failure_record("b", "short", String::new(), 0);
        ok.success = true;
        ok.error = None;
        ok.latency_ms = 100;
        ok.total_tokens = 50;
        records.push(ok.clone());
        ok.prompt_id = "c".to_string();
        ok.category = "long".to_string();
        ok.latency_ms = 300;
        records.push(ok);

        let summary = summarize(&records);
        assert_eq!(summary.total_prompts, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.success_rate, 67);
        assert_eq!(summary.avg_latency, 200);
        assert_eq!(summary.total_tokens, 100);
        assert_eq!(summary.category_breakdown["short"].total, 2);
        assert_eq!(summary.category_breakdown["short"].successful, 1);
        assert_eq!(summary.category_breakdown["long"].avg_latency, 300);
    }

    #[tokio::test]
    async fn run_once_collects_successes_and_failures_together() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini-2024",
                "service_tier": "default",
                "choices": [{
                    "finish_reason": "stop",
                    "message": {"content": "All done.", "refusal": null},
                    "logprobs": {"content": [{"logprob": -0.05}]}
                }],
                "usage": {
                    "prompt_tokens": 20,
                    "completion_tokens": 3,
                    "total_tokens": 23,
                    "prompt_tokens_details": {"cached_tokens": 0},
                    "completion_tokens_details": {"reasoning_tokens": 0}
                }
            })))
            .mount(&server)
            .await;

        let monitor = monitor_against(&server.uri());
        let summary = monitor.run_once().await.unwrap();

        assert_eq!(summary.total_prompts, battery().len() as u64);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.success_rate, 100);
        assert_eq!(summary.total_tokens, 23 * battery().len() as u64);
    }

    #[tokio::test]
    async fn upstream_errors_become_failure_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .mount(&server)
            .await;

        let monitor = monitor_against(&server.uri());
        let summary = monitor.run_once().await.unwrap();

        assert_eq!(summary.successful, 0);
        assert_eq!(summary.success_rate, 0);
        assert_eq!(summary.avg_latency, 0);
    }
}
