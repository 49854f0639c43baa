//! 测试用内存仓储

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use harvester_domain::{
    CrawlerError, CrawlerResult, TaskConfig, TaskConfigRepository, TaskLog, TaskLogFilter,
    TaskLogRepository, TaskLogStatus,
};

#[derive(Default)]
pub struct InMemoryTaskConfigRepository {
    state: Mutex<ConfigState>,
}

#[derive(Default)]
struct ConfigState {
    next_id: i64,
    configs: HashMap<i64, TaskConfig>,
}

impl InMemoryTaskConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskConfigRepository for InMemoryTaskConfigRepository {
    async fn create(&self, config: &TaskConfig) -> CrawlerResult<TaskConfig> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let mut created = config.clone();
        created.id = state.next_id;
        state.configs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> CrawlerResult<Option<TaskConfig>> {
        Ok(self.state.lock().unwrap().configs.get(&id).cloned())
    }

    async fn find_all(&self) -> CrawlerResult<Vec<TaskConfig>> {
        let mut all: Vec<TaskConfig> =
            self.state.lock().unwrap().configs.values().cloned().collect();
        all.sort_by_key(|c| c.id);
        Ok(all)
    }

    async fn find_enabled(&self) -> CrawlerResult<Vec<TaskConfig>> {
        let mut enabled: Vec<TaskConfig> = self
            .state
            .lock()
            .unwrap()
            .configs
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect();
        enabled.sort_by_key(|c| c.id);
        Ok(enabled)
    }

    async fn update(&self, config: &TaskConfig) -> CrawlerResult<TaskConfig> {
        let mut state = self.state.lock().unwrap();
        if !state.configs.contains_key(&config.id) {
            return Err(CrawlerError::task_not_found(config.id));
        }
        state.configs.insert(config.id, config.clone());
        Ok(config.clone())
    }

    async fn delete(&self, id: i64) -> CrawlerResult<bool> {
        Ok(self.state.lock().unwrap().configs.remove(&id).is_some())
    }

    async fn update_next_execution_time(
        &self,
        id: i64,
        next: Option<DateTime<Utc>>,
    ) -> CrawlerResult<()> {
        // 模拟真实仓储在IO上的让出点
        tokio::task::yield_now().await;
        if let Some(config) = self.state.lock().unwrap().configs.get_mut(&id) {
            config.next_execution_time = next;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTaskLogRepository {
    state: Mutex<LogState>,
}

#[derive(Default)]
struct LogState {
    next_id: i64,
    logs: HashMap<i64, TaskLog>,
}

impl InMemoryTaskLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskLogRepository for InMemoryTaskLogRepository {
    async fn create(&self, log: &TaskLog) -> CrawlerResult<TaskLog> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let mut created = log.clone();
        created.id = state.next_id;
        state.logs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, log: &TaskLog) -> CrawlerResult<TaskLog> {
        let mut state = self.state.lock().unwrap();
        if !state.logs.contains_key(&log.id) {
            return Err(CrawlerError::TaskLogNotFound { id: log.id });
        }
        state.logs.insert(log.id, log.clone());
        Ok(log.clone())
    }

    async fn find_by_id(&self, id: i64) -> CrawlerResult<Option<TaskLog>> {
        Ok(self.state.lock().unwrap().logs.get(&id).cloned())
    }

    async fn find_by_task_id(&self, task_id: i64, limit: i64) -> CrawlerResult<Vec<TaskLog>> {
        let mut logs: Vec<TaskLog> = self
            .state
            .lock()
            .unwrap()
            .logs
            .values()
            .filter(|l| l.task_id == Some(task_id))
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        logs.truncate(limit.max(0) as usize);
        Ok(logs)
    }

    async fn query(&self, filter: &TaskLogFilter) -> CrawlerResult<Vec<TaskLog>> {
        let mut logs: Vec<TaskLog> = self
            .state
            .lock()
            .unwrap()
            .logs
            .values()
            .filter(|l| filter.task_id.is_none_or(|id| l.task_id == Some(id)))
            .filter(|l| filter.status.is_none_or(|s| l.status == s))
            .filter(|l| filter.start_from.is_none_or(|t| l.start_time >= t))
            .filter(|l| filter.start_to.is_none_or(|t| l.start_time <= t))
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let logs: Vec<TaskLog> = logs.into_iter().skip(offset).collect();
        let mut logs = logs;
        if let Some(limit) = filter.limit {
            logs.truncate(limit.max(0) as usize);
        }
        Ok(logs)
    }

    async fn find_running(&self) -> CrawlerResult<Vec<TaskLog>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .logs
            .values()
            .filter(|l| l.status == TaskLogStatus::Running)
            .cloned()
            .collect())
    }
}
