use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use harvester_domain::CrawlerError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("爬虫系统错误: {0}")]
    Crawler(#[from] CrawlerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type) = match &self {
            ApiError::Crawler(CrawlerError::TaskNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("任务 ID {id} 不存在"),
                "TASK_NOT_FOUND",
            ),
            ApiError::Crawler(CrawlerError::TaskLogNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("执行日志 ID {id} 不存在"),
                "TASK_LOG_NOT_FOUND",
            ),
            ApiError::Crawler(CrawlerError::CrawlerNotFound { key }) => (
                StatusCode::NOT_FOUND,
                format!("爬虫 {key} 不存在"),
                "CRAWLER_NOT_FOUND",
            ),
            ApiError::Crawler(CrawlerError::CrawlerDisabled { key }) => (
                StatusCode::CONFLICT,
                format!("爬虫 {key} 已停用"),
                "CRAWLER_DISABLED",
            ),
            ApiError::Crawler(CrawlerError::DuplicateCrawlerKey { key }) => (
                StatusCode::CONFLICT,
                format!("爬虫标识 {key} 已被占用"),
                "DUPLICATE_CRAWLER_KEY",
            ),
            ApiError::Crawler(CrawlerError::InvalidCron { expr, message }) => (
                StatusCode::BAD_REQUEST,
                format!("Cron表达式 '{expr}' 无效: {message}"),
                "INVALID_CRON_EXPRESSION",
            ),
            ApiError::Crawler(CrawlerError::InvalidParams(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("任务参数无效: {msg}"),
                "INVALID_TASK_PARAMS",
            ),
            ApiError::Crawler(CrawlerError::Serialization(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("数据格式错误: {msg}"),
                "SERIALIZATION_ERROR",
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {msg}"),
                "BAD_REQUEST",
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "请求的资源不存在".to_string(),
                "NOT_FOUND",
            ),
            ApiError::Crawler(_) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
            ),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
