//! In-memory store implementations for development and tests.
//!
//! State lives in concurrent maps inside the process and is lost on restart.
//! Semantics match the DynamoDB implementations, including the atomicity of
//! usage increments (each `add` mutates one entry under its shard lock).

use super::{ProjectStore, ShareOutcome, UsageStore};
use crate::db::errors::{Result, StorageError};
use crate::db::models::projects::{Project, ProjectUpdate};
use crate::db::models::usage::{UsageDelta, UsageRecord};
use crate::types::ProjectId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct MemoryProjects {
    projects: DashMap<ProjectId, Project>,
}

impl MemoryProjects {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProjectStore for MemoryProjects {
    async fn create(&self, project: &Project) -> Result<()> {
        self.projects.insert(project.project_id, project.clone());
        Ok(())
    }

    async fn get(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(self.projects.get(&id).map(|entry| entry.clone()))
    }

    async fn update(
        &self,
        id: ProjectId,
        update: ProjectUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<Project> {
        let mut entry = self.projects.get_mut(&id).ok_or(StorageError::NotFound)?;
        entry.apply(update, updated_at);
        Ok(entry.clone())
    }

    async fn delete(&self, id: ProjectId) -> Result<()> {
        self.projects.remove(&id);
        Ok(())
    }

    async fn list_by_owner(&self, user_id: &str) -> Result<Vec<Project>> {
        Ok(self
            .projects
            .iter()
            .filter(|entry| entry.created_by_user_id == user_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn list_shared_with(&self, email: &str) -> Result<Vec<Project>> {
        Ok(self
            .projects
            .iter()
            .filter(|entry| entry.shared_with_user_emails.iter().any(|e| e == email))
            .map(|entry| entry.clone())
            .collect())
    }

    async fn share(&self, id: ProjectId, email: &str) -> Result<ShareOutcome> {
        let mut entry = self.projects.get_mut(&id).ok_or(StorageError::NotFound)?;
        if entry.shared_with_user_emails.iter().any(|e| e == email) {
            return Ok(ShareOutcome::AlreadyShared);
        }
        entry.shared_with_user_emails.push(email.to_string());
        Ok(ShareOutcome::Shared)
    }
}

#[derive(Debug, Default)]
pub struct MemoryUsage {
    records: DashMap<(String, String), UsageRecord>,
}

impl MemoryUsage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UsageStore for MemoryUsage {
    async fn fetch(&self, pk: &str, sk: &str) -> Result<Option<UsageRecord>> {
        Ok(self
            .records
            .get(&(pk.to_string(), sk.to_string()))
            .map(|entry| *entry))
    }

    async fn add(&self, pk: &str, sk: &str, delta: UsageDelta) -> Result<()> {
        let mut entry = self
            .records
            .entry((pk.to_string(), sk.to_string()))
            .or_default();
        entry.invocation_count += delta.invocations;
        entry.input_tokens += delta.input_tokens;
        entry.output_tokens += delta.output_tokens;
        entry.total_tokens += delta.total_tokens();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelRegistry;

    #[tokio::test]
    async fn project_lifecycle() {
        let registry = ModelRegistry::builtin();
        let store = MemoryProjects::new();
        let project = Project::new("user-1", &registry);
        let id = project.project_id;

        store.create(&project).await.unwrap();
        assert!(store.get(id).await.unwrap().is_some());

        let owned = store.list_by_owner("user-1").await.unwrap();
        assert_eq!(owned.len(), 1);
        assert!(store.list_by_owner("user-2").await.unwrap().is_empty());

        store.delete(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
        // deleting again is fine
        store.delete(id).await.unwrap();
    }

    #[tokio::test]
    async fn sharing_is_idempotent() {
        let registry = ModelRegistry::builtin();
        let store = MemoryProjects::new();
        let project = Project::new("user-1", &registry);
        let id = project.project_id;
        store.create(&project).await.unwrap();

        assert_eq!(
            store.share(id, "friend@example.com").await.unwrap(),
            ShareOutcome::Shared
        );
        assert_eq!(
            store.share(id, "friend@example.com").await.unwrap(),
            ShareOutcome::AlreadyShared
        );

        let shared = store.list_shared_with("friend@example.com").await.unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].shared_with_user_emails, vec!["friend@example.com"]);
    }

    #[tokio::test]
    async fn update_of_missing_project_is_not_found() {
        let store = MemoryProjects::new();
        let err = store
            .update(
                uuid::Uuid::new_v4(),
                ProjectUpdate {
                    name: "x".into(),
                    examples: vec![],
                    input_schema: vec![],
                    input_codes: vec![],
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn usage_increments_are_upserts() {
        let store = MemoryUsage::new();
        assert!(store.fetch("PK", "SK").await.unwrap().is_none());

        let delta = UsageDelta {
            invocations: 1,
            input_tokens: 10,
            output_tokens: 5,
        };
        store.add("PK", "SK", delta).await.unwrap();
        store.add("PK", "SK", delta).await.unwrap();

        let record = store.fetch("PK", "SK").await.unwrap().unwrap();
        assert_eq!(record.invocation_count, 2);
        assert_eq!(record.input_tokens, 20);
        assert_eq!(record.output_tokens, 10);
        assert_eq!(record.total_tokens, 30);
    }
}
