//! Project document types.
//!
//! Projects are whole JSON documents owned by their creator; saves replace the
//! mutable fields wholesale (last-write-wins, no version check). Field names
//! are camelCase on the wire and in storage.

use crate::registry::ModelRegistry;
use crate::types::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

/// Review status of a model's output for one example.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Approved,
    Rejected,
    #[default]
    Unknown,
}

/// One model's result for one example.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub parsed_output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: ReviewStatus,
}

/// An example-based test case: an input per the project's schema, the output
/// the author expects, and the per-model results keyed by model display name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Example {
    #[schema(value_type = Object)]
    pub input: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub results: BTreeMap<String, ModelResult>,
}

/// One field of a project's input schema.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InputField {
    pub name: String,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

/// Per-model generated glue code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InputCode {
    pub name: String,
    pub model: String,
    pub input_code: String,
}

/// A project document.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[schema(value_type = String)]
    pub project_id: ProjectId,
    pub created_by_user_id: String,
    pub name: String,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub input_schema: Vec<InputField>,
    #[serde(default)]
    pub input_codes: Vec<InputCode>,
    #[serde(default)]
    pub shared_with_user_emails: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Replacement payload for a project save (full-document replace).
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    pub name: String,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub input_schema: Vec<InputField>,
    #[serde(default)]
    pub input_codes: Vec<InputCode>,
}

impl Project {
    /// A freshly created project, seeded with one empty glue-code entry per
    /// configured model (the `inputCodes` invariant).
    pub fn new(user_id: &str, registry: &ModelRegistry) -> Self {
        let now = Utc::now();
        Self {
            project_id: Uuid::new_v4(),
            created_by_user_id: user_id.to_string(),
            name: "New Project".to_string(),
            examples: Vec::new(),
            input_schema: Vec::new(),
            input_codes: seed_input_codes(registry),
            shared_with_user_emails: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a full-document replace to the mutable fields.
    pub fn apply(&mut self, update: ProjectUpdate, updated_at: DateTime<Utc>) {
        self.name = update.name;
        self.examples = update.examples;
        self.input_schema = update.input_schema;
        self.input_codes = update.input_codes;
        self.updated_at = updated_at;
    }
}

/// One empty glue-code entry per configured model.
pub fn seed_input_codes(registry: &ModelRegistry) -> Vec<InputCode> {
    registry
        .names()
        .map(|name| InputCode {
            name: name.to_string(),
            model: name.to_string(),
            input_code: String::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_projects_carry_one_input_code_per_model() {
        let registry = ModelRegistry::builtin();
        let project = Project::new("user-1", &registry);

        assert_eq!(project.input_codes.len(), registry.len());
        let names: Vec<&str> = project.input_codes.iter().map(|c| c.name.as_str()).collect();
        let expected: Vec<&str> = registry.names().collect();
        assert_eq!(names, expected);
        assert!(project.input_codes.iter().all(|c| c.input_code.is_empty()));
    }

    #[test]
    fn examples_round_trip_per_model_results() {
        let raw = json!({
            "input": {"interest": "climbing"},
            "expectedOutput": "a scenario",
            "GPT4": {"output": "raw", "parsedOutput": {"Name": "x"}, "status": "approved"},
            "Claude 3 Haiku": {"error": "timeout", "status": "rejected"}
        });
        let example: Example = serde_json::from_value(raw).unwrap();

        assert_eq!(example.results.len(), 2);
        assert_eq!(example.results["GPT4"].status, ReviewStatus::Approved);
        assert_eq!(example.results["Claude 3 Haiku"].status, ReviewStatus::Rejected);

        let back = serde_json::to_value(&example).unwrap();
        assert_eq!(back["GPT4"]["output"], "raw");
        assert_eq!(back["expectedOutput"], "a scenario");
    }

    #[test]
    fn project_json_uses_camel_case() {
        let registry = ModelRegistry::builtin();
        let project = Project::new("user-1", &registry);
        let value = serde_json::to_value(&project).unwrap();

        for key in [
            "projectId",
            "createdByUserId",
            "inputSchema",
            "inputCodes",
            "sharedWithUserEmails",
            "createdAt",
            "updatedAt",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn apply_replaces_mutable_fields_and_touches_updated_at() {
        let registry = ModelRegistry::builtin();
        let mut project = Project::new("user-1", &registry);
        let created_at = project.created_at;

        let later = Utc::now() + chrono::Duration::seconds(5);
        project.apply(
            ProjectUpdate {
                name: "Renamed".to_string(),
                examples: vec![Example::default()],
                input_schema: vec![],
                input_codes: seed_input_codes(&registry),
            },
            later,
        );

        assert_eq!(project.name, "Renamed");
        assert_eq!(project.examples.len(), 1);
        assert_eq!(project.created_at, created_at);
        assert_eq!(project.updated_at, later);
    }
}
