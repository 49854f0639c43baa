//! SQLite数据访问层
//!
//! 连接池创建、内嵌迁移和各仓储实现

pub mod harvest_store;
pub mod task_config_repository;
pub mod task_log_repository;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

use harvester_domain::CrawlerResult;

pub use harvest_store::SqliteHarvestStore;
pub use task_config_repository::SqliteTaskConfigRepository;
pub use task_log_repository::SqliteTaskLogRepository;

/// 创建连接池并完成迁移
///
/// database_url形如 sqlite:data/harvester.db 或 sqlite::memory:；
/// 启用外键约束和WAL模式
pub async fn connect(database_url: &str) -> CrawlerResult<SqlitePool> {
    debug!("连接SQLite数据库: {}", database_url);

    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .connect_with(connect_options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// 运行数据库迁移
pub async fn run_migrations(pool: &SqlitePool) -> CrawlerResult<()> {
    debug!("执行SQLite数据库迁移");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_name TEXT NOT NULL,
            crawler_name TEXT NOT NULL,
            country_code TEXT NOT NULL,
            task_type TEXT NOT NULL,
            parameters TEXT NOT NULL DEFAULT '{}',
            keywords TEXT,
            cron_expression TEXT,
            description TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            priority INTEGER NOT NULL DEFAULT 5,
            timeout_minutes INTEGER NOT NULL DEFAULT 30,
            retry_count INTEGER NOT NULL DEFAULT 3,
            last_execution_time DATETIME,
            next_execution_time DATETIME,
            last_execution_status TEXT,
            last_execution_result TEXT,
            execution_count INTEGER NOT NULL DEFAULT 0,
            success_count INTEGER NOT NULL DEFAULT 0,
            failure_count INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER,
            batch_no TEXT NOT NULL,
            task_name TEXT NOT NULL,
            crawler_name TEXT NOT NULL,
            country_code TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'RUNNING',
            start_time DATETIME NOT NULL,
            end_time DATETIME,
            duration_seconds INTEGER,
            crawled_count INTEGER NOT NULL DEFAULT 0,
            saved_count INTEGER NOT NULL DEFAULT 0,
            skipped_count INTEGER NOT NULL DEFAULT 0,
            failed_count INTEGER NOT NULL DEFAULT 0,
            keywords_used TEXT,
            crawl_params TEXT,
            result_message TEXT,
            error_message TEXT,
            is_manual INTEGER NOT NULL DEFAULT 0,
            triggered_by TEXT NOT NULL DEFAULT 'SCHEDULER',
            execution_server TEXT,
            execution_ip TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (task_id) REFERENCES task_configs(id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS harvest_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            natural_key TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (source, natural_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_task_configs_enabled ON task_configs(enabled)",
        "CREATE INDEX IF NOT EXISTS idx_task_configs_crawler_name ON task_configs(crawler_name)",
        "CREATE INDEX IF NOT EXISTS idx_task_logs_task_id ON task_logs(task_id)",
        "CREATE INDEX IF NOT EXISTS idx_task_logs_status ON task_logs(status)",
        "CREATE INDEX IF NOT EXISTS idx_task_logs_start_time ON task_logs(start_time)",
        "CREATE INDEX IF NOT EXISTS idx_harvest_records_source ON harvest_records(source)",
    ];
    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("SQLite数据库迁移完成");
    Ok(())
}
