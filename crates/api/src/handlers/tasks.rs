use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use harvester_dispatcher::CronScheduler;
use harvester_domain::{CrawlerError, TaskConfig};

use crate::{
    error::{ApiError, ApiResult},
    response::{created, success, ApiResponse, PaginatedResponse},
    routes::AppState,
};

/// 任务创建请求
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub task_name: String,
    /// 目标爬虫唯一标识，例如 US_510K
    pub crawler_name: String,
    pub parameters: Option<serde_json::Value>,
    pub keywords: Option<String>,
    pub cron_expression: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub timeout_minutes: Option<i32>,
    pub retry_count: Option<i32>,
}

/// 任务更新请求，缺省字段保持不变；cron_expression传空串表示清除
#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub task_name: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub keywords: Option<String>,
    pub cron_expression: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub timeout_minutes: Option<i32>,
    pub retry_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct TaskQueryParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub enabled: Option<bool>,
    pub crawler_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerParams {
    pub triggered_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskLogParams {
    pub limit: Option<i64>,
}

/// 创建任务
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let executor = state
        .registry
        .get(&request.crawler_name)
        .ok_or_else(|| CrawlerError::crawler_not_found(&request.crawler_name))?;

    if let Some(expr) = request.cron_expression.as_deref().filter(|e| !e.trim().is_empty()) {
        CronScheduler::validate_expression(expr)?;
    }

    let mut config = TaskConfig::new(
        request.task_name,
        request.crawler_name,
        executor.country_code().to_string(),
        executor.crawler_type().to_string(),
        request.parameters.unwrap_or_else(|| serde_json::json!({})),
    );
    config.keywords = request.keywords;
    config.cron_expression = request
        .cron_expression
        .filter(|e| !e.trim().is_empty());
    config.description = request.description;
    if let Some(enabled) = request.enabled {
        config.enabled = enabled;
    }
    if let Some(priority) = request.priority {
        config.priority = priority;
    }
    if let Some(timeout) = request.timeout_minutes {
        config.timeout_minutes = timeout;
    }
    if let Some(retry) = request.retry_count {
        config.retry_count = retry;
    }

    let config = state.config_repo.create(&config).await?;
    if config.has_schedule() {
        state.scheduler.schedule_task(&config).await?;
    }

    info!("创建{}", config.entity_description());
    Ok(created(config))
}

/// 获取任务列表（分页）
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 200);

    let all: Vec<TaskConfig> = state
        .config_repo
        .find_all()
        .await?
        .into_iter()
        .filter(|c| params.enabled.is_none_or(|enabled| c.enabled == enabled))
        .filter(|c| {
            params
                .crawler_name
                .as_deref()
                .is_none_or(|name| c.crawler_name == name)
        })
        .collect();
    let total = all.len() as i64;
    let items: Vec<TaskConfig> = all
        .into_iter()
        .skip(((page - 1) * page_size) as usize)
        .take(page_size as usize)
        .collect();

    Ok(success(PaginatedResponse::new(items, total, page, page_size)))
}

/// 获取单个任务
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let config = state
        .config_repo
        .find_by_id(id)
        .await?
        .ok_or(CrawlerError::TaskNotFound { id })?;
    Ok(success(config))
}

/// 更新任务，Cron或启用状态变化会同步调整调度编排
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateTaskRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let mut config = state
        .config_repo
        .find_by_id(id)
        .await?
        .ok_or(CrawlerError::TaskNotFound { id })?;

    if let Some(task_name) = request.task_name {
        config.task_name = task_name;
    }
    if let Some(parameters) = request.parameters {
        config.parameters = parameters;
    }
    if let Some(keywords) = request.keywords {
        config.keywords = Some(keywords);
    }
    if let Some(expr) = request.cron_expression {
        let expr = expr.trim().to_string();
        if expr.is_empty() {
            config.cron_expression = None;
        } else {
            CronScheduler::validate_expression(&expr)?;
            config.cron_expression = Some(expr);
        }
    }
    if let Some(description) = request.description {
        config.description = Some(description);
    }
    if let Some(enabled) = request.enabled {
        config.enabled = enabled;
    }
    if let Some(priority) = request.priority {
        config.priority = priority;
    }
    if let Some(timeout) = request.timeout_minutes {
        config.timeout_minutes = timeout;
    }
    if let Some(retry) = request.retry_count {
        config.retry_count = retry;
    }

    let config = state.config_repo.update(&config).await?;
    if config.has_schedule() {
        state.scheduler.reschedule_task(&config).await?;
    } else {
        state.scheduler.cancel_task(config.id);
    }

    Ok(success(config))
}

/// 删除任务并取消其编排
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl axum::response::IntoResponse> {
    state.scheduler.cancel_task(id);
    if !state.config_repo.delete(id).await? {
        return Err(ApiError::Crawler(CrawlerError::TaskNotFound { id }));
    }
    info!("删除任务 {}", id);
    Ok(ApiResponse::success_empty_with_message(format!(
        "任务 {id} 已删除"
    )))
}

/// 启用任务，有Cron则恢复编排
pub async fn enable_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let mut config = state
        .config_repo
        .find_by_id(id)
        .await?
        .ok_or(CrawlerError::TaskNotFound { id })?;
    config.enabled = true;
    let config = state.config_repo.update(&config).await?;
    if config.has_schedule() {
        state.scheduler.schedule_task(&config).await?;
    }
    Ok(success(config))
}

/// 停用任务并取消编排
pub async fn disable_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let mut config = state
        .config_repo
        .find_by_id(id)
        .await?
        .ok_or(CrawlerError::TaskNotFound { id })?;
    config.enabled = false;
    let config = state.config_repo.update(&config).await?;
    state.scheduler.cancel_task(id);
    Ok(success(config))
}

/// 暂停定时触发（保留配置，可恢复）
pub async fn pause_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !state.scheduler.pause_task(id) {
        return Err(ApiError::BadRequest(format!("任务 {id} 未在编排中")));
    }
    Ok(ApiResponse::success_empty_with_message(format!(
        "任务 {id} 已暂停"
    )))
}

/// 恢复定时触发
pub async fn resume_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !state.scheduler.resume_task(id).await? {
        return Err(ApiError::BadRequest(format!("任务 {id} 不在暂停状态")));
    }
    Ok(ApiResponse::success_empty_with_message(format!(
        "任务 {id} 已恢复"
    )))
}

/// 手动触发一次执行，同步返回执行日志
pub async fn trigger_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<TriggerParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let triggered_by = params.triggered_by.unwrap_or_else(|| "API".to_string());
    let log = state.execution.trigger_task(id, &triggered_by).await?;
    Ok(success(log))
}

/// 获取任务的最近执行日志
pub async fn get_task_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<TaskLogParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    // 确认任务存在，避免对任意ID返回空列表
    state
        .config_repo
        .find_by_id(id)
        .await?
        .ok_or(CrawlerError::TaskNotFound { id })?;

    let limit = params.limit.unwrap_or(20).clamp(1, 500);
    let logs = state.log_repo.find_by_task_id(id, limit).await?;
    Ok(success(logs))
}
