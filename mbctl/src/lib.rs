//! # mbctl: ModelBench Control Layer
//!
//! `mbctl` is the control plane of ModelBench, a platform for testing,
//! comparing, and proxying requests across third-party LLM providers
//! (OpenAI, Anthropic, Groq, Cohere). It provides a RESTful API for managing
//! example-based test projects, a credential-injecting proxy for provider
//! requests, a streaming invocation path for the configured model catalog,
//! monthly usage accounting with quota enforcement, and an offline API
//! monitoring tool.
//!
//! ## Overview
//!
//! Applications that evaluate multiple LLMs face the same plumbing problems:
//! every provider has its own endpoint, credential header, request shape and
//! response shape, and someone has to keep per-user spending in check. This
//! crate centralizes that plumbing. Clients describe *what* to run (a model
//! display name plus parameters, or a raw provider request), and the control
//! layer resolves the model's request template, injects the provider
//! credential, enforces the monthly ceilings, issues the call and extracts
//! the generated text from the provider-specific response shape.
//!
//! ### Request Flow
//!
//! A `POST /models/{model_name}/invoke` request is authenticated against the
//! shared JWT secret, checked against the caller's and the global monthly
//! quota, compiled into a concrete provider request via the model registry,
//! and streamed: each upstream chunk is parsed, navigated along the model's
//! result path, and the extracted text forwarded. When the stream ends,
//! invocation and token counters are incremented for both the user and the
//! global scope.
//!
//! `POST /proxy` is the low-level sibling: the caller supplies the full URL,
//! headers and body; the control layer identifies the provider from the URL,
//! injects the matching API key when the caller has none, and passes the
//! provider's response through verbatim.
//!
//! ### Core Components
//!
//! - [`registry`]: immutable catalog of models, templates and pricing
//! - [`compile`]: template + parameters -> request descriptor
//! - [`tokens`]: BPE token estimation and dollar cost lookup
//! - [`ledger`]: monthly usage counters and quota enforcement
//! - [`dispatch`]: provider identification, credential injection, HTTP
//! - [`db`]: project and usage stores (DynamoDB or in-memory)
//! - [`monitor`]: the offline prompt battery
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use mbctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = mbctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     mbctl::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod compile;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod errors;
pub mod ledger;
pub mod monitor;
mod openapi;
pub mod registry;
pub mod telemetry;
pub mod tokens;
pub mod types;

use crate::{
    config::StorageConfig,
    db::handlers::{
        DynamoProjects, DynamoUsage, MemoryProjects, MemoryUsage, ProjectStore, UsageStore,
        dynamo_client,
    },
    dispatch::Dispatcher,
    ledger::Ledger,
    monitor::ApiMonitor,
    openapi::ApiDoc,
    registry::ModelRegistry,
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{ProjectId, UserId};

/// Application state shared across all request handlers.
///
/// Everything in here is cheap to clone: configuration by value, the rest
/// behind `Arc`s. Stores are trait objects so handlers are oblivious to
/// whether they talk to DynamoDB or the in-memory backend.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub registry: Arc<ModelRegistry>,
    pub projects: Arc<dyn ProjectStore>,
    pub usage: Arc<Ledger>,
    pub dispatcher: Arc<Dispatcher>,
    pub monitor: Arc<ApiMonitor>,
}

/// Build the application state from configuration: registry, stores,
/// dispatcher and monitor.
pub async fn build_state(config: Config) -> anyhow::Result<AppState> {
    let registry = Arc::new(ModelRegistry::builtin());

    let (projects, usage_store): (Arc<dyn ProjectStore>, Arc<dyn UsageStore>) =
        match &config.storage {
            StorageConfig::Memory => {
                info!("Using in-memory storage (state is lost on restart)");
                (Arc::new(MemoryProjects::new()), Arc::new(MemoryUsage::new()))
            }
            StorageConfig::Dynamo {
                region,
                endpoint_url,
                projects_table,
                usage_table,
            } => {
                info!(%projects_table, %usage_table, "Using DynamoDB storage");
                let client = dynamo_client(region.as_deref(), endpoint_url.as_deref()).await;
                (
                    Arc::new(DynamoProjects::new(client.clone(), projects_table)),
                    Arc::new(DynamoUsage::new(client, usage_table)),
                )
            }
        };

    // The monitor only persists history when a bucket is configured
    let s3 = if config.monitor.bucket.is_some() {
        let sdk = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Some(aws_sdk_s3::Client::new(&sdk))
    } else {
        None
    };

    let dispatcher = Arc::new(Dispatcher::new(config.providers.clone(), &config.upstream)?);
    let usage = Arc::new(Ledger::new(usage_store, config.throttle.clone()));
    let monitor = Arc::new(ApiMonitor::new(
        &config.monitor,
        config.providers.openai_api_key.clone(),
        s3,
    )?);

    Ok(AppState::builder()
        .config(config)
        .registry(registry)
        .projects(projects)
        .usage(usage)
        .dispatcher(dispatcher)
        .monitor(monitor)
        .build())
}

/// Assemble the router: open routes, authenticated API routes, docs, layers.
pub fn build_router(state: AppState) -> Router {
    // Open routes: liveness and the monitoring trigger (invoked by schedulers)
    let open_routes = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route(
            "/monitor-once",
            post(api::handlers::monitor::monitor_once),
        );

    // Authenticated routes; each handler takes a CurrentUser extractor
    let api_routes = Router::new()
        .route("/proxy", post(api::handlers::proxy::proxy))
        .route("/models", get(api::handlers::models::list_models))
        .route(
            "/models/{model_name}/invoke",
            post(api::handlers::proxy::invoke_model),
        )
        .route("/projects", post(api::handlers::projects::create_project))
        .route(
            "/projects/owner",
            get(api::handlers::projects::list_owner_projects),
        )
        .route(
            "/projects/shared",
            get(api::handlers::projects::list_shared_projects),
        )
        .route(
            "/projects/{project_id}",
            get(api::handlers::projects::get_project),
        )
        .route(
            "/projects/{project_id}",
            put(api::handlers::projects::update_project),
        )
        .route(
            "/projects/{project_id}",
            delete(api::handlers::projects::delete_project),
        )
        .route(
            "/projects/{project_id}/share",
            post(api::handlers::projects::share_project),
        )
        .route(
            "/projects/{project_id}/optimize-prompt",
            post(api::handlers::projects::optimize_prompt),
        );

    Router::new()
        .merge(open_routes)
        .merge(api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Main application struct that owns the router and configuration.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] builds the state (stores, dispatcher,
///    registry) and the router
/// 2. **Serve**: [`Application::serve`] binds the TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting control layer with configuration: {:#?}", config);

        let state = build_state(config.clone()).await?;
        let router = build_router(state);

        Ok(Self { router, config })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Control layer listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auth::session::create_session_token;
    use crate::db::models::projects::Project;
    use axum_test::TestServer;
    use serde_json::{Value, json};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> Config {
        Config {
            secret_key: Some("test-secret".to_string()),
            ..Default::default()
        }
    }

    async fn test_server(config: Config) -> (TestServer, String) {
        let token = create_session_token("user-1", "user-1@example.com", &config).unwrap();
        let state = build_state(config).await.unwrap();
        let server = TestServer::new(build_router(state)).unwrap();
        (server, token)
    }

    #[tokio::test]
    async fn requests_without_a_token_are_unauthorized() {
        let (server, _) = test_server(test_config()).await;

        for path in ["/models", "/projects/owner"] {
            let response = server.get(path).await;
            assert_eq!(response.status_code(), 401, "{path} should require auth");
            let body: Value = response.json();
            assert!(body["error"].is_string());
        }

        let response = server
            .get("/models")
            .authorization_bearer("not-a-real-token")
            .await;
        assert_eq!(response.status_code(), 401);
    }

    #[tokio::test]
    async fn healthz_is_open() {
        let (server, _) = test_server(test_config()).await;
        let response = server.get("/healthz").await;
        assert_eq!(response.status_code(), 200);
    }

    #[tokio::test]
    async fn models_listing_returns_the_registry() {
        let (server, token) = test_server(test_config()).await;

        let response = server.get("/models").authorization_bearer(&token).await;
        assert_eq!(response.status_code(), 200);

        let body: Value = response.json();
        let models = body.as_object().unwrap();
        assert_eq!(models.len(), 14);
        assert_eq!(models["GPT4"]["provider"], "OpenAI");
        // Decimal costs serialize as strings
        assert_eq!(models["Claude 3.5 Sonnet"]["cost"]["output"], "15");
    }

    #[tokio::test]
    async fn project_crud_lifecycle() {
        let (server, token) = test_server(test_config()).await;

        // create
        let created = server.post("/projects").authorization_bearer(&token).await;
        assert_eq!(created.status_code(), 201);
        let project: Project = created.json();
        assert_eq!(project.name, "New Project");
        assert_eq!(project.created_by_user_id, "user-1");
        let id = project.project_id;

        // owner listing sees it
        let owned = server
            .get("/projects/owner")
            .authorization_bearer(&token)
            .await;
        let owned: Vec<Project> = owned.json();
        assert_eq!(owned.len(), 1);

        // get attaches metadata
        let fetched = server
            .get(&format!("/projects/{id}"))
            .authorization_bearer(&token)
            .await;
        assert_eq!(fetched.status_code(), 200);
        let body: Value = fetched.json();
        assert_eq!(body["projectId"], id.to_string());
        assert!(body["metadata"]["GPT4"].is_object());

        // save with the seeded input codes
        let saved = server
            .put(&format!("/projects/{id}"))
            .authorization_bearer(&token)
            .json(&json!({
                "name": "Renamed",
                "examples": [{"input": {"q": "hi"}, "expectedOutput": "ok"}],
                "inputSchema": [{"name": "q", "type": "string"}],
                "inputCodes": project.input_codes,
            }))
            .await;
        assert_eq!(saved.status_code(), 200);
        let saved: Project = saved.json();
        assert_eq!(saved.name, "Renamed");
        assert_eq!(saved.examples.len(), 1);
        assert!(saved.updated_at >= project.updated_at);

        // delete, then it's gone
        let deleted = server
            .delete(&format!("/projects/{id}"))
            .authorization_bearer(&token)
            .await;
        assert_eq!(deleted.status_code(), 204);
        let missing = server
            .get(&format!("/projects/{id}"))
            .authorization_bearer(&token)
            .await;
        assert_eq!(missing.status_code(), 404);
    }

    #[tokio::test]
    async fn saving_with_mismatched_input_codes_is_rejected() {
        let (server, token) = test_server(test_config()).await;

        let created = server.post("/projects").authorization_bearer(&token).await;
        let project: Project = created.json();

        let response = server
            .put(&format!("/projects/{}", project.project_id))
            .authorization_bearer(&token)
            .json(&json!({
                "name": "x",
                "examples": [],
                "inputSchema": [],
                "inputCodes": [{"name": "GPT4", "model": "GPT4", "inputCode": ""}],
            }))
            .await;
        assert_eq!(response.status_code(), 400);
        let body: Value = response.json();
        assert!(
            body["error"].as_str().unwrap().contains("inputCodes"),
            "unexpected error: {body}"
        );
    }

    #[tokio::test]
    async fn sharing_grants_read_access_by_email() {
        let config = test_config();
        let other_token =
            create_session_token("user-2", "friend@example.com", &config).unwrap();
        let (server, token) = test_server(config).await;

        let created = server.post("/projects").authorization_bearer(&token).await;
        let project: Project = created.json();
        let id = project.project_id;

        let shared = server
            .post(&format!("/projects/{id}/share"))
            .authorization_bearer(&token)
            .json(&json!({"userEmail": "friend@example.com"}))
            .await;
        assert_eq!(shared.status_code(), 200);
        let body: Value = shared.json();
        assert_eq!(body["message"], "Project shared");

        // sharing again reports so
        let again = server
            .post(&format!("/projects/{id}/share"))
            .authorization_bearer(&token)
            .json(&json!({"userEmail": "friend@example.com"}))
            .await;
        let body: Value = again.json();
        assert_eq!(body["message"], "Email already shared with this project");

        // the other user sees it in their shared listing
        let listing = server
            .get("/projects/shared")
            .authorization_bearer(&other_token)
            .await;
        let listing: Vec<Project> = listing.json();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].project_id, id);
    }

    #[tokio::test]
    async fn invoking_an_unknown_model_is_a_bad_request() {
        let (server, token) = test_server(test_config()).await;

        let response = server
            .post("/models/No%20Such%20Model/invoke")
            .authorization_bearer(&token)
            .json(&json!({"parameters": {}}))
            .await;
        assert_eq!(response.status_code(), 400);
    }

    #[tokio::test]
    async fn invocations_over_the_ceiling_are_throttled() {
        let mut config = test_config();
        config.throttle.monthly_limit_user = 0;
        let (server, token) = test_server(config).await;

        let response = server
            .post("/models/GPT4/invoke")
            .authorization_bearer(&token)
            .json(&json!({"parameters": {"messages": [{"role": "user", "content": "hi"}]}}))
            .await;
        assert_eq!(response.status_code(), 429);
        let body: Value = response.json();
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .contains("monthly usage limit")
        );
    }

    #[tokio::test]
    async fn proxy_forwards_and_wraps_upstream_errors() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answer": 42})))
            .expect(1)
            .mount(&upstream)
            .await;

        let (server, token) = test_server(test_config()).await;

        // happy path: body comes back verbatim
        let response = server
            .post("/proxy")
            .authorization_bearer(&token)
            .json(&json!({
                "url": upstream.uri(),
                "options": {"headers": {"Content-Type": "application/json"}, "body": {"q": 1}}
            }))
            .await;
        assert_eq!(response.status_code(), 200);
        let body: Value = response.json();
        assert_eq!(body["answer"], 42);

        // upstream failure: status passed through, body wrapped
        upstream.reset().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(418).set_body_json(json!({"nope": true})))
            .mount(&upstream)
            .await;

        let response = server
            .post("/proxy")
            .authorization_bearer(&token)
            .json(&json!({"url": upstream.uri(), "options": {"headers": {}, "body": {}}}))
            .await;
        assert_eq!(response.status_code(), 418);
        let body: Value = response.json();
        assert_eq!(body["error"]["nope"], true);
    }
}
