//! 领域层
//!
//! 定义采集任务调度系统的核心实体、错误类型和仓储抽象

pub mod entities;
pub mod errors;
pub mod repositories;

pub use entities::{
    CrawlResult, TaskConfig, TaskLog, TaskLogFilter, TaskLogStatus,
};
pub use errors::{CrawlerError, CrawlerResult};
pub use repositories::{TaskConfigRepository, TaskLogRepository};
