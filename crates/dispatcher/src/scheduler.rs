use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use harvester_domain::{CrawlerError, CrawlerResult, TaskConfig, TaskConfigRepository};

use crate::cron_utils::CronScheduler;
use crate::execution::TaskExecutionService;

/// 已编排的定时任务
struct ScheduledEntry {
    handle: JoinHandle<()>,
    cron_expression: String,
}

/// 动态任务调度器
///
/// 每个已编排任务持有一个常驻定时循环，到点后派生独立的执行任务，
/// 因此取消编排绝不会中断进行中的爬取。所有编排操作在运行期生效，
/// 不需要重启进程
pub struct DynamicTaskScheduler {
    config_repo: Arc<dyn TaskConfigRepository>,
    execution: Arc<TaskExecutionService>,
    /// 任务ID -> 定时循环句柄
    timers: Mutex<HashMap<i64, ScheduledEntry>>,
    /// 暂停中的任务：任务ID -> 暂停前的Cron表达式
    paused: Mutex<HashMap<i64, String>>,
}

impl DynamicTaskScheduler {
    pub fn new(
        config_repo: Arc<dyn TaskConfigRepository>,
        execution: Arc<TaskExecutionService>,
    ) -> Self {
        Self {
            config_repo,
            execution,
            timers: Mutex::new(HashMap::new()),
            paused: Mutex::new(HashMap::new()),
        }
    }

    /// 启动时加载全部启用任务并逐一编排
    ///
    /// 单个任务的Cron无效只跳过该任务，不影响其余任务
    pub async fn initialize(&self) -> CrawlerResult<usize> {
        let configs = self.config_repo.find_enabled().await?;
        let mut scheduled = 0usize;

        for config in &configs {
            if !config.has_schedule() {
                debug!("任务 {} 未配置Cron，仅手动触发", config.task_name);
                continue;
            }
            match self.schedule_task(config).await {
                Ok(()) => scheduled += 1,
                Err(e) => {
                    error!(
                        "任务 {} (ID: {}) 编排失败，已跳过: {}",
                        config.task_name, config.id, e
                    );
                }
            }
        }

        info!("调度器初始化完成，已编排 {} 个定时任务", scheduled);
        Ok(scheduled)
    }

    /// 编排一个定时任务
    ///
    /// 幂等：已编排的同ID任务先取消旧定时器再按新表达式重建，
    /// 不会出现双重触发
    pub async fn schedule_task(&self, config: &TaskConfig) -> CrawlerResult<()> {
        let cron_expr = config
            .cron_expression
            .as_deref()
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
            .ok_or_else(|| {
                CrawlerError::invalid_params(format!(
                    "任务 {} 没有Cron表达式，无法编排",
                    config.task_name
                ))
            })?;

        // 先验证再取消旧定时器，表达式无效时保留原有编排
        let scheduler = CronScheduler::new(cron_expr)?;

        self.cancel_task(config.id);
        self.paused.lock().expect("scheduler lock poisoned").remove(&config.id);

        let next = scheduler.next_execution_time(Utc::now());
        self.write_back_next_time(config.id, next).await;

        let handle = self.spawn_timer_loop(config.id, config.task_name.clone(), scheduler);
        let replaced = self.timers.lock().expect("scheduler lock poisoned").insert(
            config.id,
            ScheduledEntry {
                handle,
                cron_expression: cron_expr.to_string(),
            },
        );
        // 同ID并发编排时，取消和插入之间隔着一次await，
        // 被替换下来的旧定时循环在此终止，保证每个ID只剩一个定时器
        if let Some(old) = replaced {
            old.handle.abort();
        }

        info!(
            "任务 {} (ID: {}) 已编排，Cron: {}，下次执行: {:?}",
            config.task_name, config.id, cron_expr, next
        );
        Ok(())
    }

    /// 常驻定时循环：睡到下一个触发点，派生执行，再计算下一轮
    fn spawn_timer_loop(
        &self,
        task_id: i64,
        task_name: String,
        scheduler: CronScheduler,
    ) -> JoinHandle<()> {
        let execution = self.execution.clone();
        let config_repo = self.config_repo.clone();

        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = scheduler.next_execution_time(now) else {
                    warn!("任务 {} 的Cron不再产生触发点，定时循环退出", task_name);
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                debug!(
                    "任务 {} 下次触发: {}，等待{}秒",
                    task_name,
                    next.format("%Y-%m-%d %H:%M:%S UTC"),
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;

                // 执行在独立任务中进行，取消编排不会波及进行中的爬取
                let execution = execution.clone();
                let name = task_name.clone();
                tokio::spawn(async move {
                    match execution.execute_scheduled(task_id).await {
                        Ok(Some(log)) => {
                            debug!("任务 {} 定时执行完成，日志ID: {}", name, log.id);
                        }
                        Ok(None) => {}
                        Err(e) => error!("任务 {} 定时执行出错: {}", name, e),
                    }
                });

                let upcoming = scheduler.next_execution_time(Utc::now());
                if let Err(e) = config_repo
                    .update_next_execution_time(task_id, upcoming)
                    .await
                {
                    warn!("回写任务 {} 下次执行时间失败: {}", task_id, e);
                }
            }
        })
    }

    async fn write_back_next_time(
        &self,
        task_id: i64,
        next: Option<chrono::DateTime<Utc>>,
    ) {
        if let Err(e) = self.config_repo.update_next_execution_time(task_id, next).await {
            warn!("回写任务 {} 下次执行时间失败: {}", task_id, e);
        }
    }

    /// 取消编排，进行中的执行不受影响
    pub fn cancel_task(&self, task_id: i64) -> bool {
        let removed = self
            .timers
            .lock()
            .expect("scheduler lock poisoned")
            .remove(&task_id);
        match removed {
            Some(entry) => {
                entry.handle.abort();
                info!("任务 {} 的定时编排已取消", task_id);
                true
            }
            None => false,
        }
    }

    /// 暂停定时触发，记住Cron表达式以便恢复
    pub fn pause_task(&self, task_id: i64) -> bool {
        let entry = self
            .timers
            .lock()
            .expect("scheduler lock poisoned")
            .remove(&task_id);
        match entry {
            Some(entry) => {
                entry.handle.abort();
                self.paused
                    .lock()
                    .expect("scheduler lock poisoned")
                    .insert(task_id, entry.cron_expression);
                info!("任务 {} 已暂停定时触发", task_id);
                true
            }
            None => {
                warn!("任务 {} 未在编排中，无法暂停", task_id);
                false
            }
        }
    }

    /// 恢复暂停的任务，按数据库中当前的配置重新编排
    pub async fn resume_task(&self, task_id: i64) -> CrawlerResult<bool> {
        let paused_cron = self
            .paused
            .lock()
            .expect("scheduler lock poisoned")
            .remove(&task_id);
        if paused_cron.is_none() {
            warn!("任务 {} 不在暂停状态，无法恢复", task_id);
            return Ok(false);
        }

        let config = match self.config_repo.find_by_id(task_id).await? {
            Some(config) => config,
            None => {
                warn!("任务 {} 已被删除，放弃恢复", task_id);
                return Ok(false);
            }
        };
        if !config.has_schedule() {
            info!("任务 {} 已停用或清空了Cron，放弃恢复", task_id);
            return Ok(false);
        }

        self.schedule_task(&config).await?;
        Ok(true)
    }

    /// 按新配置重建编排（Cron变更后调用）
    pub async fn reschedule_task(&self, config: &TaskConfig) -> CrawlerResult<()> {
        self.schedule_task(config).await
    }

    pub fn is_scheduled(&self, task_id: i64) -> bool {
        self.timers
            .lock()
            .expect("scheduler lock poisoned")
            .contains_key(&task_id)
    }

    pub fn is_paused(&self, task_id: i64) -> bool {
        self.paused
            .lock()
            .expect("scheduler lock poisoned")
            .contains_key(&task_id)
    }

    pub fn scheduled_task_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .timers
            .lock()
            .expect("scheduler lock poisoned")
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn scheduled_count(&self) -> usize {
        self.timers.lock().expect("scheduler lock poisoned").len()
    }

    pub fn paused_count(&self) -> usize {
        self.paused.lock().expect("scheduler lock poisoned").len()
    }

    /// 停机：取消全部定时循环（进行中的执行自然结束）
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock().expect("scheduler lock poisoned");
        let count = timers.len();
        for (_, entry) in timers.drain() {
            entry.handle.abort();
        }
        self.paused.lock().expect("scheduler lock poisoned").clear();
        info!("调度器已停机，取消了 {} 个定时编排", count);
    }
}

impl Drop for DynamicTaskScheduler {
    fn drop(&mut self) {
        if let Ok(mut timers) = self.timers.lock() {
            for (_, entry) in timers.drain() {
                entry.handle.abort();
            }
        }
    }
}
