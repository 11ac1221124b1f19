//! Monthly usage ledger: quota checks and usage recording.
//!
//! Every completed invocation increments counters for two scopes - the
//! calling user and the global total - under the current calendar month.
//! Quota enforcement reads both scopes and rejects once either invocation
//! count has reached its ceiling.
//!
//! Known imprecisions, carried deliberately from the system this replaces:
//! the check and the increment are separate storage operations, so concurrent
//! requests near a ceiling can all pass the check before any of them
//! increments (bursty overage is tolerated); and usage recorded for a call
//! whose dispatch later fails is not rolled back (at-least-once
//! overcounting). Recording failures after a successful provider call are
//! logged by callers, not retried.

use crate::config::ThrottleConfig;
use crate::db::handlers::UsageStore;
use crate::db::models::usage::{UsageDelta, global_pk, model_sk, month_key, user_pk};
use crate::errors::{Error, Result};
use chrono::Utc;
use std::sync::Arc;

pub struct Ledger {
    store: Arc<dyn UsageStore>,
    limits: ThrottleConfig,
}

impl Ledger {
    pub fn new(store: Arc<dyn UsageStore>, limits: ThrottleConfig) -> Self {
        Self { store, limits }
    }

    /// Reject with 429 once the user's or the global invocation count for the
    /// current month has reached its ceiling.
    pub async fn check_and_throttle(&self, user_id: &str, model_id: &str) -> Result<()> {
        let month = month_key(Utc::now());
        let sk = model_sk(model_id);

        let user_usage = self.store.fetch(&user_pk(user_id, &month), &sk).await?;
        let global_usage = self.store.fetch(&global_pk(&month), &sk).await?;

        let user_count = user_usage.map(|r| r.invocation_count).unwrap_or(0);
        let global_count = global_usage.map(|r| r.invocation_count).unwrap_or(0);

        if user_count >= self.limits.monthly_limit_user
            || global_count >= self.limits.monthly_limit_global
        {
            return Err(Error::Throttled);
        }
        Ok(())
    }

    /// Record one completed invocation for both scopes (upsert-by-increment).
    pub async fn record_usage(
        &self,
        user_id: &str,
        model_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<()> {
        let month = month_key(Utc::now());
        let sk = model_sk(model_id);
        let delta = UsageDelta {
            invocations: 1,
            input_tokens,
            output_tokens,
        };

        self.store.add(&user_pk(user_id, &month), &sk, delta).await?;
        self.store.add(&global_pk(&month), &sk, delta).await?;
        Ok(())
    }
}
