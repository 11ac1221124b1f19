//! OpenAPI document assembly.
//!
//! All endpoint annotations live next to their handlers; this module only
//! collects them and registers the bearer auth scheme. The rendered
//! documentation is served at `/docs`.

use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ModelBench Control Layer",
        description = "Test, compare, and proxy requests across LLM providers"
    ),
    paths(
        crate::api::handlers::proxy::proxy,
        crate::api::handlers::proxy::invoke_model,
        crate::api::handlers::models::list_models,
        crate::api::handlers::projects::create_project,
        crate::api::handlers::projects::list_owner_projects,
        crate::api::handlers::projects::list_shared_projects,
        crate::api::handlers::projects::get_project,
        crate::api::handlers::projects::update_project,
        crate::api::handlers::projects::delete_project,
        crate::api::handlers::projects::share_project,
        crate::api::handlers::projects::optimize_prompt,
        crate::api::handlers::monitor::monitor_once,
    ),
    components(schemas(
        crate::api::models::proxy::ProxyRequest,
        crate::api::models::proxy::ProxyOptions,
        crate::api::models::proxy::InvokeRequest,
        crate::api::models::projects::ProjectWithMetadata,
        crate::api::models::projects::ShareRequest,
        crate::api::models::projects::ShareResponse,
        crate::api::models::projects::OptimizeRequest,
        crate::api::models::projects::OptimizeResponse,
        crate::db::models::projects::Project,
        crate::db::models::projects::ProjectUpdate,
        crate::db::models::projects::Example,
        crate::db::models::projects::ModelResult,
        crate::db::models::projects::ReviewStatus,
        crate::db::models::projects::InputField,
        crate::db::models::projects::InputCode,
        crate::registry::ModelMetadata,
        crate::registry::ModelCost,
        crate::monitor::MonitorSummary,
        crate::monitor::MonitorRecord,
        crate::monitor::CategoryStats,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "proxy", description = "Provider request proxying and model invocation"),
        (name = "models", description = "Model registry"),
        (name = "projects", description = "Example-based test projects"),
        (name = "monitoring", description = "Offline API monitoring"),
    )
)]
pub struct ApiDoc;
