//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Proxy** (`/proxy`): forward a caller-built provider request with
//!   credential injection
//! - **Invoke** (`/models/{model_name}/invoke`): compile and stream a request
//!   for a configured model, with quota enforcement and usage recording
//! - **Models** (`/models`): registry metadata listing
//! - **Projects** (`/projects/*`): CRUD, sharing and prompt optimization for
//!   example-based test projects
//! - **Monitoring** (`/monitor-once`): run the offline API monitor battery
//!
//! All endpoints except `/healthz` and `/monitor-once` require a bearer JWT.
//! Endpoints are documented with OpenAPI annotations via `utoipa`; the
//! rendered documentation is served at `/docs`.

pub mod handlers;
pub mod models;
