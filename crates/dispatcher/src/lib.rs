//! 调度层
//!
//! Cron解析工具、动态任务调度器和任务执行服务

pub mod cron_utils;
pub mod execution;
pub mod scheduler;

pub use cron_utils::CronScheduler;
pub use execution::TaskExecutionService;
pub use scheduler::DynamicTaskScheduler;
