use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CrawlerError {
    #[error("数据库操作失败: {0}")]
    DatabaseOperation(String),
    #[error("任务不存在: id={id}")]
    TaskNotFound { id: i64 },
    #[error("执行日志不存在: id={id}")]
    TaskLogNotFound { id: i64 },
    #[error("爬虫不存在: key={key}")]
    CrawlerNotFound { key: String },
    #[error("爬虫已停用: key={key}")]
    CrawlerDisabled { key: String },
    #[error("爬虫标识冲突: key={key}")]
    DuplicateCrawlerKey { key: String },
    #[error("Cron表达式 '{expr}' 无效: {message}")]
    InvalidCron { expr: String, message: String },
    #[error("任务参数无效: {0}")]
    InvalidParams(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("数据序列化错误: {0}")]
    Serialization(String),
    #[error("网络请求失败: {0}")]
    Network(String),
    #[error("执行超时: 超过{minutes}分钟")]
    ExecutionTimeout { minutes: i32 },
    #[error("爬取执行失败: {0}")]
    Execution(String),
    #[error("系统内部错误: {0}")]
    Internal(String),
}

pub type CrawlerResult<T> = Result<T, CrawlerError>;

impl CrawlerError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn task_not_found(id: i64) -> Self {
        Self::TaskNotFound { id }
    }
    pub fn crawler_not_found<S: Into<String>>(key: S) -> Self {
        Self::CrawlerNotFound { key: key.into() }
    }
    pub fn invalid_cron<S: Into<String>, M: Into<String>>(expr: S, message: M) -> Self {
        Self::InvalidCron {
            expr: expr.into(),
            message: message.into(),
        }
    }
    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParams(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn execution_error<S: Into<String>>(msg: S) -> Self {
        Self::Execution(msg.into())
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrawlerError::DatabaseOperation(_)
                | CrawlerError::Network(_)
                | CrawlerError::ExecutionTimeout { .. }
        )
    }
    /// 配置类错误应在配置API同步返回给调用方，而不是留在执行日志里
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            CrawlerError::InvalidCron { .. }
                | CrawlerError::InvalidParams(_)
                | CrawlerError::Configuration(_)
                | CrawlerError::CrawlerNotFound { .. }
                | CrawlerError::DuplicateCrawlerKey { .. }
        )
    }
}

impl From<sqlx::Error> for CrawlerError {
    fn from(err: sqlx::Error) -> Self {
        CrawlerError::DatabaseOperation(err.to_string())
    }
}

impl From<serde_json::Error> for CrawlerError {
    fn from(err: serde_json::Error) -> Self {
        CrawlerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for CrawlerError {
    fn from(err: anyhow::Error) -> Self {
        CrawlerError::Internal(err.to_string())
    }
}
