use crate::{AppState, auth::CurrentUser, errors::Result, registry::ModelMetadata};
use axum::{Json, extract::State};
use std::collections::BTreeMap;

/// List the configured models
#[utoipa::path(
    get,
    path = "/models",
    tag = "models",
    summary = "List configured models",
    description = "Display metadata for every model in the registry, keyed by display name",
    responses(
        (status = 200, description = "Model metadata by display name", body = Object),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_jwt" = []))
)]
pub async fn list_models(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<BTreeMap<String, ModelMetadata>>> {
    Ok(Json(state.registry.metadata()))
}
