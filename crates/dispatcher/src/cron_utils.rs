use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

use harvester_domain::{CrawlerError, CrawlerResult};

/// Cron表达式解析和调度计算工具
///
/// 任务配置沿用传统的5字段表达式（分 时 日 月 周）；cron库要求
/// 秒字段，解析前统一补齐
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> CrawlerResult<Self> {
        let normalized = normalize_expression(cron_expr)?;
        let schedule = Schedule::from_str(&normalized).map_err(|e| {
            CrawlerError::invalid_cron(cron_expr, e.to_string())
        })?;
        Ok(Self { schedule })
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.schedule.after(&now).next().map(|next| next - now)
    }

    /// 验证Cron表达式是否有效
    pub fn validate_expression(cron_expr: &str) -> CrawlerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}

/// 5字段表达式补齐秒字段；6/7字段原样透传
fn normalize_expression(cron_expr: &str) -> CrawlerResult<String> {
    let trimmed = cron_expr.trim();
    if trimmed.is_empty() {
        return Err(CrawlerError::invalid_cron(cron_expr, "表达式为空"));
    }
    match trimmed.split_whitespace().count() {
        5 => Ok(format!("0 {trimmed}")),
        6 | 7 => Ok(trimmed.to_string()),
        n => Err(CrawlerError::invalid_cron(
            cron_expr,
            format!("字段数量无效: {n}，期望5、6或7个字段"),
        )),
    }
}
