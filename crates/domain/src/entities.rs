use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 统一任务配置
///
/// 一个可调度（或仅手动触发）的采集任务的持久化描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub id: i64,
    pub task_name: String,
    /// 目标爬虫的唯一标识，格式：{国家代码}_{类型}，例如 US_510K
    pub crawler_name: String,
    pub country_code: String,
    pub task_type: String,
    /// 参数配置，仅由目标爬虫解释
    pub parameters: serde_json::Value,
    /// 关键词列表（JSON文本，保留用于向后兼容）
    pub keywords: Option<String>,
    /// 为空表示仅手动触发
    pub cron_expression: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub priority: i32,
    pub timeout_minutes: i32,
    pub retry_count: i32,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub next_execution_time: Option<DateTime<Utc>>,
    pub last_execution_status: Option<String>,
    pub last_execution_result: Option<String>,
    pub execution_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskConfig {
    pub fn new(
        task_name: String,
        crawler_name: String,
        country_code: String,
        task_type: String,
        parameters: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            task_name,
            crawler_name,
            country_code,
            task_type,
            parameters,
            keywords: None,
            cron_expression: None,
            description: None,
            enabled: true,
            priority: 5,
            timeout_minutes: 30, // 默认30分钟超时
            retry_count: 3,
            last_execution_time: None,
            next_execution_time: None,
            last_execution_status: None,
            last_execution_result: None,
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 是否具备定时调度条件（启用且Cron非空）
    pub fn has_schedule(&self) -> bool {
        self.enabled
            && self
                .cron_expression
                .as_deref()
                .is_some_and(|expr| !expr.trim().is_empty())
    }

    /// 计算成功率（百分比）
    pub fn success_rate(&self) -> f64 {
        if self.execution_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.execution_count as f64 * 100.0
    }

    /// 获取任务状态描述
    pub fn task_status(&self) -> &str {
        if !self.enabled {
            return "DISABLED";
        }
        match &self.last_execution_status {
            Some(status) => status,
            None => "READY",
        }
    }

    /// 更新执行统计
    pub fn update_execution_stats(&mut self, success: bool, result: &str) {
        self.execution_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.last_execution_time = Some(Utc::now());
        self.last_execution_status = Some(if success { "SUCCESS" } else { "FAILED" }.to_string());
        self.last_execution_result = Some(result.to_string());
        self.updated_at = Utc::now();
    }

    pub fn entity_description(&self) -> String {
        format!(
            "任务 '{}' (ID: {}, 爬虫: {})",
            self.task_name, self.id, self.crawler_name
        )
    }
}

/// 执行日志状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskLogStatus {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

impl TaskLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskLogStatus::Running => "RUNNING",
            TaskLogStatus::Success => "SUCCESS",
            TaskLogStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for TaskLogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(TaskLogStatus::Running),
            "SUCCESS" => Ok(TaskLogStatus::Success),
            "FAILED" => Ok(TaskLogStatus::Failed),
            _ => Err(format!("Invalid task log status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskLogStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskLogStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskLogStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 统一任务执行日志
///
/// 每次执行尝试（定时或手动）对应一条持久化记录，在任何爬取工作开始前写入，
/// 进程中途崩溃会留下可见的RUNNING记录供运维排查
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: i64,
    /// 临时手动执行可以没有任务配置
    pub task_id: Option<i64>,
    pub batch_no: String,
    pub task_name: String,
    pub crawler_name: String,
    pub country_code: String,
    pub status: TaskLogStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub crawled_count: i32,
    pub saved_count: i32,
    pub skipped_count: i32,
    pub failed_count: i32,
    pub keywords_used: Option<String>,
    pub crawl_params: Option<String>,
    pub result_message: Option<String>,
    pub error_message: Option<String>,
    pub is_manual: bool,
    pub triggered_by: String,
    pub execution_server: Option<String>,
    pub execution_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskLog {
    pub fn begin(
        task_id: Option<i64>,
        task_name: &str,
        crawler_name: &str,
        country_code: &str,
        is_manual: bool,
        triggered_by: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            task_id,
            batch_no: Uuid::new_v4().to_string()[..8].to_string(),
            task_name: task_name.to_string(),
            crawler_name: crawler_name.to_string(),
            country_code: country_code.to_string(),
            status: TaskLogStatus::Running,
            start_time: now,
            end_time: None,
            duration_seconds: None,
            crawled_count: 0,
            saved_count: 0,
            skipped_count: 0,
            failed_count: 0,
            keywords_used: None,
            crawl_params: None,
            result_message: None,
            error_message: None,
            is_manual,
            triggered_by: triggered_by.to_string(),
            execution_server: None,
            execution_ip: None,
            created_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self.status, TaskLogStatus::Running)
    }

    /// 以成功或失败收尾，设置结束时间并计算时长
    pub fn finish(&mut self, status: TaskLogStatus) {
        debug_assert!(!matches!(status, TaskLogStatus::Running));
        self.status = status;
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
        self.calculate_duration();
    }

    pub fn calculate_duration(&mut self) {
        if let Some(end) = self.end_time {
            self.duration_seconds = Some((end - self.start_time).num_seconds());
        }
    }

    pub fn apply_result(&mut self, result: &CrawlResult) {
        self.crawled_count = result.crawled_count;
        self.saved_count = result.saved_count;
        self.skipped_count = result.skipped_count;
        self.failed_count = result.failed_count;
        self.result_message = Some(result.message.clone());
        self.error_message = result.error_message.clone();
        self.finish(if result.success {
            TaskLogStatus::Success
        } else {
            TaskLogStatus::Failed
        });
    }
}

/// 执行日志查询条件
#[derive(Debug, Clone, Default)]
pub struct TaskLogFilter {
    pub task_id: Option<i64>,
    pub status: Option<TaskLogStatus>,
    pub start_from: Option<DateTime<Utc>>,
    pub start_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 爬取结果
///
/// 爬虫执行器返回的内存结构，执行服务是它与执行日志之间唯一的转换者
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub success: bool,
    pub message: String,
    pub crawled_count: i32,
    pub saved_count: i32,
    pub skipped_count: i32,
    pub failed_count: i32,
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl CrawlResult {
    pub fn success(
        message: impl Into<String>,
        crawled_count: i32,
        saved_count: i32,
        skipped_count: i32,
    ) -> Self {
        Self {
            success: true,
            message: message.into(),
            crawled_count,
            saved_count,
            skipped_count,
            failed_count: 0,
            error_message: None,
            duration_ms: 0,
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            crawled_count: 0,
            saved_count: 0,
            skipped_count: 0,
            failed_count: 0,
            error_message: Some(error.into()),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}
