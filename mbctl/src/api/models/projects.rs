//! Request/response shapes for the project endpoints.

use crate::db::models::projects::Project;
use crate::registry::ModelMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// A project together with the registry metadata the UI renders next to it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectWithMetadata {
    #[serde(flatten)]
    pub project: Project,
    pub metadata: BTreeMap<String, ModelMetadata>,
}

/// Body of `POST /projects/{project_id}/share`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub user_email: String,
}

/// Outcome message for a share request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShareResponse {
    pub message: String,
}

/// Body of `POST /projects/{project_id}/optimize-prompt`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    /// Display name of the model configuration to generate glue code for
    pub selected_config: String,
}

/// Generated glue code for the selected model configuration.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeResponse {
    pub input_code: String,
}
