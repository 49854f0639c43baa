use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use harvester_crawler::{CrawlParams, CrawlerRegistry};
use harvester_domain::{
    CrawlerError, CrawlerResult, TaskConfig, TaskConfigRepository, TaskLog, TaskLogRepository,
    TaskLogStatus,
};

/// 任务执行服务
///
/// 每次触发（定时或手动）的统一执行入口。职责顺序固定：
/// 先落RUNNING日志，再查爬虫、校验参数、带超时执行，
/// 最后收尾日志并回写任务统计。任何一步失败都会留下FAILED日志，
/// 绝不出现触发了却无迹可查的执行
pub struct TaskExecutionService {
    registry: Arc<CrawlerRegistry>,
    config_repo: Arc<dyn TaskConfigRepository>,
    log_repo: Arc<dyn TaskLogRepository>,
    server_name: Option<String>,
    server_ip: Option<String>,
}

/// 探测本机出口IP，UDP connect不会真正发包；探测不到就留空
fn local_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

impl TaskExecutionService {
    pub fn new(
        registry: Arc<CrawlerRegistry>,
        config_repo: Arc<dyn TaskConfigRepository>,
        log_repo: Arc<dyn TaskLogRepository>,
    ) -> Self {
        let server_name = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok());
        Self {
            registry,
            config_repo,
            log_repo,
            server_name,
            server_ip: local_ip(),
        }
    }

    /// 执行一个任务配置
    ///
    /// 执行类失败（爬虫缺失、参数无效、超时、爬取出错）记录为FAILED日志
    /// 并正常返回；Err只表示日志本身无法持久化
    pub async fn execute_task(
        &self,
        config: &TaskConfig,
        is_manual: bool,
        triggered_by: &str,
    ) -> CrawlerResult<TaskLog> {
        info!(
            "开始执行{}，触发方式: {}，触发者: {}",
            config.entity_description(),
            if is_manual { "手动" } else { "定时" },
            triggered_by
        );

        // 任何爬取动作之前先写RUNNING日志
        let mut log = TaskLog::begin(
            (config.id != 0).then_some(config.id),
            &config.task_name,
            &config.crawler_name,
            &config.country_code,
            is_manual,
            triggered_by,
        );
        log.execution_server = self.server_name.clone();
        log.execution_ip = self.server_ip.clone();
        log.keywords_used = config.keywords.clone();
        log.crawl_params = serde_json::to_string(&config.parameters).ok();
        let mut log = self.log_repo.create(&log).await?;

        let outcome = self.run_crawl(config, is_manual, triggered_by).await;

        match outcome {
            Ok(result) => {
                info!(
                    "任务 {} 执行{}: {} (耗时{}ms)",
                    config.task_name,
                    if result.success { "成功" } else { "失败" },
                    result.message,
                    result.duration_ms
                );
                log.apply_result(&result);
            }
            Err(e) => {
                error!("任务 {} 执行出错: {}", config.task_name, e);
                log.error_message = Some(e.to_string());
                log.result_message = Some("执行出错".to_string());
                log.finish(TaskLogStatus::Failed);
            }
        }

        let log = self.log_repo.update(&log).await?;
        self.update_config_stats(config, &log).await;
        Ok(log)
    }

    /// 定位爬虫、校验参数并带超时执行
    async fn run_crawl(
        &self,
        config: &TaskConfig,
        is_manual: bool,
        triggered_by: &str,
    ) -> CrawlerResult<harvester_domain::CrawlResult> {
        let executor = self
            .registry
            .get(&config.crawler_name)
            .ok_or_else(|| CrawlerError::crawler_not_found(&config.crawler_name))?;

        if !self.registry.is_enabled(&config.crawler_name) {
            return Err(CrawlerError::CrawlerDisabled {
                key: config.crawler_name.clone(),
            });
        }

        let mut params = CrawlParams::from_value(&config.parameters);
        params.task_id = (config.id != 0).then_some(config.id);
        params.task_name = Some(config.task_name.clone());
        params.is_manual = is_manual;
        params.triggered_by = Some(triggered_by.to_string());

        // 参数负载没给关键词时回落到任务配置的keywords列
        if params.all_keywords().is_empty() {
            if let Some(keywords) = &config.keywords {
                if let Ok(list) = serde_json::from_str::<Vec<String>>(keywords) {
                    params.keywords = list;
                }
            }
        }

        if !executor.validate(&params) {
            return Err(CrawlerError::invalid_params(format!(
                "爬虫 {} 参数校验未通过",
                config.crawler_name
            )));
        }

        let timeout = Duration::from_secs(config.timeout_minutes.max(0) as u64 * 60);
        match tokio::time::timeout(timeout, executor.execute(&params)).await {
            Ok(result) => result,
            Err(_) => Err(CrawlerError::ExecutionTimeout {
                minutes: config.timeout_minutes,
            }),
        }
    }

    /// 回写任务统计，失败只记日志不影响本次执行结果
    async fn update_config_stats(&self, config: &TaskConfig, log: &TaskLog) {
        if config.id == 0 {
            return;
        }
        // 重新读取，避免覆盖执行期间的其他配置变更
        let fresh = match self.config_repo.find_by_id(config.id).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => {
                warn!("任务 {} 已被删除，跳过统计回写", config.id);
                return;
            }
            Err(e) => {
                warn!("读取任务 {} 失败，跳过统计回写: {}", config.id, e);
                return;
            }
        };

        let mut fresh = fresh;
        let success = log.status == TaskLogStatus::Success;
        let summary = log
            .result_message
            .clone()
            .or_else(|| log.error_message.clone())
            .unwrap_or_default();
        fresh.update_execution_stats(success, &summary);

        if let Err(e) = self.config_repo.update(&fresh).await {
            warn!("回写任务 {} 统计失败: {}", config.id, e);
        }
    }

    /// 手动触发一次任务执行
    pub async fn trigger_task(
        &self,
        task_id: i64,
        triggered_by: &str,
    ) -> CrawlerResult<TaskLog> {
        let config = self
            .config_repo
            .find_by_id(task_id)
            .await?
            .ok_or(CrawlerError::TaskNotFound { id: task_id })?;
        self.execute_task(&config, true, triggered_by).await
    }

    /// 定时触发入口：按ID重读配置，已删除或已停用的任务静默跳过
    ///
    /// 触发时刻只携带任务ID，配置以触发那一刻数据库里的为准
    pub async fn execute_scheduled(&self, task_id: i64) -> CrawlerResult<Option<TaskLog>> {
        let config = match self.config_repo.find_by_id(task_id).await? {
            Some(config) => config,
            None => {
                warn!("定时触发的任务 {} 已不存在，跳过", task_id);
                return Ok(None);
            }
        };
        if !config.enabled {
            info!("任务 {} 已停用，跳过本次定时执行", config.task_name);
            return Ok(None);
        }
        self.execute_task(&config, false, "SCHEDULER").await.map(Some)
    }

    /// 对一次失败的执行发起重试，生成全新的执行日志
    pub async fn retry_failed(
        &self,
        log_id: i64,
        triggered_by: &str,
    ) -> CrawlerResult<TaskLog> {
        let log = self
            .log_repo
            .find_by_id(log_id)
            .await?
            .ok_or(CrawlerError::TaskLogNotFound { id: log_id })?;

        if log.status != TaskLogStatus::Failed {
            return Err(CrawlerError::invalid_params(format!(
                "执行日志 {} 状态为 {}，只有FAILED可以重试",
                log_id,
                log.status.as_str()
            )));
        }
        let task_id = log.task_id.ok_or_else(|| {
            CrawlerError::invalid_params("临时执行没有关联任务配置，无法重试")
        })?;

        info!("重试失败的执行日志 {} (任务 {})", log_id, task_id);
        self.trigger_task(task_id, triggered_by).await
    }

    /// 启动时兜底：进程上次退出时未收尾的RUNNING日志统一标记为失败
    ///
    /// 服务刚启动时不可能有真正进行中的执行，残留的RUNNING记录
    /// 必然来自崩溃或强制停机
    pub async fn recover_orphaned_logs(&self) -> CrawlerResult<usize> {
        let orphans = self.log_repo.find_running().await?;
        let count = orphans.len();

        for mut log in orphans {
            warn!(
                "发现遗留的RUNNING执行日志 {} (任务: {})，标记为失败",
                log.id, log.task_name
            );
            log.result_message = Some("执行中断".to_string());
            log.error_message = Some("进程重启时执行尚未完成".to_string());
            log.finish(TaskLogStatus::Failed);
            if let Err(e) = self.log_repo.update(&log).await {
                warn!("收尾遗留日志 {} 失败: {}", log.id, e);
            }
        }

        if count > 0 {
            info!("已清理 {} 条遗留的RUNNING执行日志", count);
        }
        Ok(count)
    }
}
