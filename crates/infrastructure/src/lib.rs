//! 基础设施层
//!
//! SQLite仓储实现和采集结果落库

pub mod database;

pub use database::{
    connect, run_migrations, SqliteHarvestStore, SqliteTaskConfigRepository,
    SqliteTaskLogRepository,
};
