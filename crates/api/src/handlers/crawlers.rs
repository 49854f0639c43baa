use axum::extract::{Path, State};

use harvester_domain::CrawlerError;

use crate::{
    error::ApiResult,
    response::{success, ApiResponse},
    routes::AppState,
};

/// 列出已注册的爬虫及启用状态
pub async fn list_crawlers(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(state.registry.crawler_info()))
}

/// 注册中心统计
pub async fn get_crawler_statistics(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(state.registry.statistics()))
}

/// 启用爬虫
pub async fn enable_crawler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !state.registry.set_enabled(&key, true) {
        return Err(CrawlerError::crawler_not_found(key).into());
    }
    Ok(ApiResponse::success_empty_with_message(format!(
        "爬虫 {key} 已启用"
    )))
}

/// 停用爬虫，只拦截后续执行，不影响任务配置
pub async fn disable_crawler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !state.registry.set_enabled(&key, false) {
        return Err(CrawlerError::crawler_not_found(key).into());
    }
    Ok(ApiResponse::success_empty_with_message(format!(
        "爬虫 {key} 已停用"
    )))
}
