use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use harvester_crawler::CrawlerRegistry;
use harvester_dispatcher::{DynamicTaskScheduler, TaskExecutionService};
use harvester_domain::{TaskConfigRepository, TaskLogRepository};

use crate::handlers::{
    crawlers::{disable_crawler, enable_crawler, get_crawler_statistics, list_crawlers},
    health::health_check,
    logs::{get_log, list_logs, retry_log},
    tasks::{
        create_task, delete_task, disable_task, enable_task, get_task, get_task_logs,
        list_tasks, pause_task, resume_task, trigger_task, update_task,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub config_repo: Arc<dyn TaskConfigRepository>,
    pub log_repo: Arc<dyn TaskLogRepository>,
    pub registry: Arc<CrawlerRegistry>,
    pub scheduler: Arc<DynamicTaskScheduler>,
    pub execution: Arc<TaskExecutionService>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 任务配置管理API
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/update", post(update_task))
        .route("/api/tasks/{id}/delete", post(delete_task))
        .route("/api/tasks/{id}/enable", post(enable_task))
        .route("/api/tasks/{id}/disable", post(disable_task))
        .route("/api/tasks/{id}/pause", post(pause_task))
        .route("/api/tasks/{id}/resume", post(resume_task))
        .route("/api/tasks/{id}/trigger", post(trigger_task))
        .route("/api/tasks/{id}/logs", get(get_task_logs))
        // 执行日志API
        .route("/api/logs", get(list_logs))
        .route("/api/logs/{id}", get(get_log))
        .route("/api/logs/{id}/retry", post(retry_log))
        // 爬虫管理API
        .route("/api/crawlers", get(list_crawlers))
        .route("/api/crawlers/statistics", get(get_crawler_statistics))
        .route("/api/crawlers/{key}/enable", post(enable_crawler))
        .route("/api/crawlers/{key}/disable", post(disable_crawler))
        .with_state(state)
}
