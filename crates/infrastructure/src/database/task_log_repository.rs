use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use harvester_domain::{
    CrawlerError, CrawlerResult, TaskLog, TaskLogFilter, TaskLogRepository, TaskLogStatus,
};

pub struct SqliteTaskLogRepository {
    pool: SqlitePool,
}

impl SqliteTaskLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_log(row: &sqlx::sqlite::SqliteRow) -> CrawlerResult<TaskLog> {
        Ok(TaskLog {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            batch_no: row.try_get("batch_no")?,
            task_name: row.try_get("task_name")?,
            crawler_name: row.try_get("crawler_name")?,
            country_code: row.try_get("country_code")?,
            status: row.try_get("status")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            duration_seconds: row.try_get("duration_seconds")?,
            crawled_count: row.try_get("crawled_count")?,
            saved_count: row.try_get("saved_count")?,
            skipped_count: row.try_get("skipped_count")?,
            failed_count: row.try_get("failed_count")?,
            keywords_used: row.try_get("keywords_used")?,
            crawl_params: row.try_get("crawl_params")?,
            result_message: row.try_get("result_message")?,
            error_message: row.try_get("error_message")?,
            is_manual: row.try_get("is_manual")?,
            triggered_by: row.try_get("triggered_by")?,
            execution_server: row.try_get("execution_server")?,
            execution_ip: row.try_get("execution_ip")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl TaskLogRepository for SqliteTaskLogRepository {
    async fn create(&self, log: &TaskLog) -> CrawlerResult<TaskLog> {
        let result = sqlx::query(
            r#"
            INSERT INTO task_logs (
                task_id, batch_no, task_name, crawler_name, country_code, status,
                start_time, end_time, duration_seconds, crawled_count, saved_count,
                skipped_count, failed_count, keywords_used, crawl_params,
                result_message, error_message, is_manual, triggered_by,
                execution_server, execution_ip, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.task_id)
        .bind(&log.batch_no)
        .bind(&log.task_name)
        .bind(&log.crawler_name)
        .bind(&log.country_code)
        .bind(log.status)
        .bind(log.start_time)
        .bind(log.end_time)
        .bind(log.duration_seconds)
        .bind(log.crawled_count)
        .bind(log.saved_count)
        .bind(log.skipped_count)
        .bind(log.failed_count)
        .bind(&log.keywords_used)
        .bind(&log.crawl_params)
        .bind(&log.result_message)
        .bind(&log.error_message)
        .bind(log.is_manual)
        .bind(&log.triggered_by)
        .bind(&log.execution_server)
        .bind(&log.execution_ip)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("创建执行日志: {} (批次: {})", id, log.batch_no);
        self.find_by_id(id)
            .await?
            .ok_or_else(|| CrawlerError::database_error("创建执行日志后读取失败"))
    }

    async fn update(&self, log: &TaskLog) -> CrawlerResult<TaskLog> {
        let result = sqlx::query(
            r#"
            UPDATE task_logs SET
                status = ?, end_time = ?, duration_seconds = ?, crawled_count = ?,
                saved_count = ?, skipped_count = ?, failed_count = ?,
                result_message = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(log.status)
        .bind(log.end_time)
        .bind(log.duration_seconds)
        .bind(log.crawled_count)
        .bind(log.saved_count)
        .bind(log.skipped_count)
        .bind(log.failed_count)
        .bind(&log.result_message)
        .bind(&log.error_message)
        .bind(log.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CrawlerError::TaskLogNotFound { id: log.id });
        }
        self.find_by_id(log.id)
            .await?
            .ok_or(CrawlerError::TaskLogNotFound { id: log.id })
    }

    async fn find_by_id(&self, id: i64) -> CrawlerResult<Option<TaskLog>> {
        let row = sqlx::query("SELECT * FROM task_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_log).transpose()
    }

    async fn find_by_task_id(&self, task_id: i64, limit: i64) -> CrawlerResult<Vec<TaskLog>> {
        let rows = sqlx::query(
            "SELECT * FROM task_logs WHERE task_id = ? ORDER BY start_time DESC LIMIT ?",
        )
        .bind(task_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_log).collect()
    }

    async fn query(&self, filter: &TaskLogFilter) -> CrawlerResult<Vec<TaskLog>> {
        // 动态拼接查询条件，参数顺序与占位符一致
        let mut sql = String::from("SELECT * FROM task_logs WHERE 1=1");
        if filter.task_id.is_some() {
            sql.push_str(" AND task_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.start_from.is_some() {
            sql.push_str(" AND start_time >= ?");
        }
        if filter.start_to.is_some() {
            sql.push_str(" AND start_time <= ?");
        }
        sql.push_str(" ORDER BY start_time DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(task_id) = filter.task_id {
            query = query.bind(task_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        if let Some(from) = filter.start_from {
            query = query.bind(from);
        }
        if let Some(to) = filter.start_to {
            query = query.bind(to);
        }
        query = query
            .bind(filter.limit.unwrap_or(100))
            .bind(filter.offset.unwrap_or(0));

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_log).collect()
    }

    async fn find_running(&self) -> CrawlerResult<Vec<TaskLog>> {
        let rows = sqlx::query(
            "SELECT * FROM task_logs WHERE status = ? ORDER BY start_time",
        )
        .bind(TaskLogStatus::Running)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_log).collect()
    }
}
