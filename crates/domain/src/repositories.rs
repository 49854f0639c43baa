//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{TaskConfig, TaskLog, TaskLogFilter};
use crate::errors::CrawlerResult;

/// 任务配置仓储抽象
#[async_trait]
pub trait TaskConfigRepository: Send + Sync {
    async fn create(&self, config: &TaskConfig) -> CrawlerResult<TaskConfig>;
    async fn find_by_id(&self, id: i64) -> CrawlerResult<Option<TaskConfig>>;
    async fn find_all(&self) -> CrawlerResult<Vec<TaskConfig>>;
    async fn find_enabled(&self) -> CrawlerResult<Vec<TaskConfig>>;
    async fn update(&self, config: &TaskConfig) -> CrawlerResult<TaskConfig>;
    async fn delete(&self, id: i64) -> CrawlerResult<bool>;
    /// 调度器回写下次触发时间，失败只影响展示，不影响调度
    async fn update_next_execution_time(
        &self,
        id: i64,
        next: Option<DateTime<Utc>>,
    ) -> CrawlerResult<()>;
}

/// 执行日志仓储抽象
#[async_trait]
pub trait TaskLogRepository: Send + Sync {
    async fn create(&self, log: &TaskLog) -> CrawlerResult<TaskLog>;
    async fn update(&self, log: &TaskLog) -> CrawlerResult<TaskLog>;
    async fn find_by_id(&self, id: i64) -> CrawlerResult<Option<TaskLog>>;
    async fn find_by_task_id(&self, task_id: i64, limit: i64) -> CrawlerResult<Vec<TaskLog>>;
    async fn query(&self, filter: &TaskLogFilter) -> CrawlerResult<Vec<TaskLog>>;
    /// 仍处于RUNNING状态的日志，用于发现进程崩溃遗留的执行
    async fn find_running(&self) -> CrawlerResult<Vec<TaskLog>>;
}
