use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use harvester_domain::{
    CrawlerError, CrawlerResult, TaskConfig, TaskConfigRepository,
};

pub struct SqliteTaskConfigRepository {
    pool: SqlitePool,
}

impl SqliteTaskConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> CrawlerResult<TaskConfig> {
        let parameters: String = row.try_get("parameters")?;
        let parameters = serde_json::from_str(&parameters)?;

        Ok(TaskConfig {
            id: row.try_get("id")?,
            task_name: row.try_get("task_name")?,
            crawler_name: row.try_get("crawler_name")?,
            country_code: row.try_get("country_code")?,
            task_type: row.try_get("task_type")?,
            parameters,
            keywords: row.try_get("keywords")?,
            cron_expression: row.try_get("cron_expression")?,
            description: row.try_get("description")?,
            enabled: row.try_get("enabled")?,
            priority: row.try_get("priority")?,
            timeout_minutes: row.try_get("timeout_minutes")?,
            retry_count: row.try_get("retry_count")?,
            last_execution_time: row.try_get("last_execution_time")?,
            next_execution_time: row.try_get("next_execution_time")?,
            last_execution_status: row.try_get("last_execution_status")?,
            last_execution_result: row.try_get("last_execution_result")?,
            execution_count: row.try_get("execution_count")?,
            success_count: row.try_get("success_count")?,
            failure_count: row.try_get("failure_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskConfigRepository for SqliteTaskConfigRepository {
    async fn create(&self, config: &TaskConfig) -> CrawlerResult<TaskConfig> {
        let parameters = serde_json::to_string(&config.parameters)?;
        let result = sqlx::query(
            r#"
            INSERT INTO task_configs (
                task_name, crawler_name, country_code, task_type, parameters,
                keywords, cron_expression, description, enabled, priority,
                timeout_minutes, retry_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&config.task_name)
        .bind(&config.crawler_name)
        .bind(&config.country_code)
        .bind(&config.task_type)
        .bind(&parameters)
        .bind(&config.keywords)
        .bind(&config.cron_expression)
        .bind(&config.description)
        .bind(config.enabled)
        .bind(config.priority)
        .bind(config.timeout_minutes)
        .bind(config.retry_count)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("创建任务配置: {} (ID: {})", config.task_name, id);
        self.find_by_id(id)
            .await?
            .ok_or_else(|| CrawlerError::database_error("创建任务配置后读取失败"))
    }

    async fn find_by_id(&self, id: i64) -> CrawlerResult<Option<TaskConfig>> {
        let row = sqlx::query("SELECT * FROM task_configs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_config).transpose()
    }

    async fn find_all(&self) -> CrawlerResult<Vec<TaskConfig>> {
        let rows = sqlx::query("SELECT * FROM task_configs ORDER BY priority DESC, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_config).collect()
    }

    async fn find_enabled(&self) -> CrawlerResult<Vec<TaskConfig>> {
        let rows = sqlx::query(
            "SELECT * FROM task_configs WHERE enabled = 1 ORDER BY priority DESC, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_config).collect()
    }

    async fn update(&self, config: &TaskConfig) -> CrawlerResult<TaskConfig> {
        let parameters = serde_json::to_string(&config.parameters)?;
        let result = sqlx::query(
            r#"
            UPDATE task_configs SET
                task_name = ?, crawler_name = ?, country_code = ?, task_type = ?,
                parameters = ?, keywords = ?, cron_expression = ?, description = ?,
                enabled = ?, priority = ?, timeout_minutes = ?, retry_count = ?,
                last_execution_time = ?, next_execution_time = ?,
                last_execution_status = ?, last_execution_result = ?,
                execution_count = ?, success_count = ?, failure_count = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&config.task_name)
        .bind(&config.crawler_name)
        .bind(&config.country_code)
        .bind(&config.task_type)
        .bind(&parameters)
        .bind(&config.keywords)
        .bind(&config.cron_expression)
        .bind(&config.description)
        .bind(config.enabled)
        .bind(config.priority)
        .bind(config.timeout_minutes)
        .bind(config.retry_count)
        .bind(config.last_execution_time)
        .bind(config.next_execution_time)
        .bind(&config.last_execution_status)
        .bind(&config.last_execution_result)
        .bind(config.execution_count)
        .bind(config.success_count)
        .bind(config.failure_count)
        .bind(Utc::now())
        .bind(config.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CrawlerError::task_not_found(config.id));
        }
        self.find_by_id(config.id)
            .await?
            .ok_or(CrawlerError::TaskNotFound { id: config.id })
    }

    async fn delete(&self, id: i64) -> CrawlerResult<bool> {
        let result = sqlx::query("DELETE FROM task_configs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_next_execution_time(
        &self,
        id: i64,
        next: Option<DateTime<Utc>>,
    ) -> CrawlerResult<()> {
        sqlx::query("UPDATE task_configs SET next_execution_time = ? WHERE id = ?")
            .bind(next)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
