//! Usage record types and key formatting.
//!
//! Usage is tracked per (scope, model, calendar month). Records live under a
//! composite key: the partition key names the scope and month
//! (`USER#<id>#<monthStart>` or `GLOBAL#<monthStart>`) and the sort key names
//! the model (`MODEL#<id>`). Counters only ever grow within a month; a new
//! month starts a fresh record, and old records are kept as history.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Counter snapshot for one (scope, model, month).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub invocation_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Increment applied to a usage record.
#[derive(Debug, Clone, Copy)]
pub struct UsageDelta {
    pub invocations: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageDelta {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// First instant of the month containing `now`, in UTC.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("first of the month is a valid UTC timestamp")
}

/// Month key used inside partition keys, e.g. `2026-08-01T00:00:00.000Z`.
pub fn month_key(now: DateTime<Utc>) -> String {
    month_start(now)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Partition key for a user's monthly usage.
pub fn user_pk(user_id: &str, month: &str) -> String {
    format!("USER#{user_id}#{month}")
}

/// Partition key for the global monthly usage.
pub fn global_pk(month: &str) -> String {
    format!("GLOBAL#{month}")
}

/// Sort key for one model's counters.
pub fn model_sk(model_id: &str) -> String {
    format!("MODEL#{model_id}")
}
