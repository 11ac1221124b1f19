//! Store traits and their implementations.

mod dynamo;
mod memory;

pub use dynamo::{DynamoProjects, DynamoUsage, dynamo_client, init_tables};
pub use memory::{MemoryProjects, MemoryUsage};

use crate::db::errors::Result;
use crate::db::models::projects::{Project, ProjectUpdate};
use crate::db::models::usage::{UsageDelta, UsageRecord};
use crate::types::ProjectId;
use chrono::{DateTime, Utc};

/// Outcome of adding an email to a project's share list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    AlreadyShared,
}

/// Data access for project documents.
#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    /// Persist a freshly created project document.
    async fn create(&self, project: &Project) -> Result<()>;

    /// Fetch a project by id.
    async fn get(&self, id: ProjectId) -> Result<Option<Project>>;

    /// Replace the mutable fields of a project and return the stored document.
    /// Last write wins; there is no version check.
    async fn update(
        &self,
        id: ProjectId,
        update: ProjectUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<Project>;

    /// Delete a project. Deleting a missing project is not an error.
    async fn delete(&self, id: ProjectId) -> Result<()>;

    /// All projects created by the given user.
    async fn list_by_owner(&self, user_id: &str) -> Result<Vec<Project>>;

    /// All projects whose share list contains the given email.
    async fn list_shared_with(&self, email: &str) -> Result<Vec<Project>>;

    /// Append an email to a project's share list, once.
    async fn share(&self, id: ProjectId, email: &str) -> Result<ShareOutcome>;
}

/// Data access for monthly usage counters.
#[async_trait::async_trait]
pub trait UsageStore: Send + Sync {
    /// Read the counters under (pk, sk), if the record exists.
    async fn fetch(&self, pk: &str, sk: &str) -> Result<Option<UsageRecord>>;

    /// Atomically add the delta to the counters under (pk, sk), creating the
    /// record if it does not exist (upsert-by-increment).
    async fn add(&self, pk: &str, sk: &str, delta: UsageDelta) -> Result<()>;
}
