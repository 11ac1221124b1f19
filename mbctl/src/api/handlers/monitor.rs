use crate::{AppState, errors::Result, monitor::MonitorSummary};
use axum::{Json, extract::State};

/// Run the monitoring battery once
#[utoipa::path(
    post,
    path = "/monitor-once",
    tag = "monitoring",
    summary = "Run the API monitoring battery once",
    description = "Fires every prompt scenario concurrently against the configured model, \
                   appends the observations to the S3 history and returns the run summary. \
                   Unauthenticated, for invocation by schedulers.",
    responses(
        (status = 200, description = "Run summary", body = MonitorSummary),
        (status = 500, description = "Monitoring run failed"),
    )
)]
pub async fn monitor_once(State(state): State<AppState>) -> Result<Json<MonitorSummary>> {
    let summary = state.monitor.run_once().await?;
    Ok(Json(summary))
}
