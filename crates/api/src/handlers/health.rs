use axum::extract::State;
use serde::Serialize;

use crate::{error::ApiResult, response::success, routes::AppState};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub registered_crawlers: usize,
    pub scheduled_tasks: usize,
    pub paused_tasks: usize,
}

/// 健康检查
pub async fn health_check(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(HealthStatus {
        status: "UP",
        registered_crawlers: state.registry.count(),
        scheduled_tasks: state.scheduler.scheduled_count(),
        paused_tasks: state.scheduler.paused_count(),
    }))
}
