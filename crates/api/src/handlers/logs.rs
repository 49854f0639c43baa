use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use harvester_domain::{CrawlerError, TaskLogFilter};

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LogQueryParams {
    pub task_id: Option<i64>,
    /// RUNNING / SUCCESS / FAILED
    pub status: Option<String>,
    pub start_from: Option<DateTime<Utc>>,
    pub start_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RetryParams {
    pub triggered_by: Option<String>,
}

/// 按条件查询执行日志
pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let status = params
        .status
        .as_deref()
        .map(|s| {
            s.parse()
                .map_err(|_| ApiError::BadRequest(format!("无效的日志状态: {s}")))
        })
        .transpose()?;

    let filter = TaskLogFilter {
        task_id: params.task_id,
        status,
        start_from: params.start_from,
        start_to: params.start_to,
        limit: Some(params.limit.unwrap_or(50).clamp(1, 500)),
        offset: Some(params.offset.unwrap_or(0).max(0)),
    };
    let logs = state.log_repo.query(&filter).await?;
    Ok(success(logs))
}

/// 获取单条执行日志
pub async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let log = state
        .log_repo
        .find_by_id(id)
        .await?
        .ok_or(CrawlerError::TaskLogNotFound { id })?;
    Ok(success(log))
}

/// 对失败的执行发起重试，返回新的执行日志
pub async fn retry_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<RetryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let triggered_by = params.triggered_by.unwrap_or_else(|| "API".to_string());
    let log = state.execution.retry_failed(id, &triggered_by).await?;
    Ok(success(log))
}
