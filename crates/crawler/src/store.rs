use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use harvester_domain::CrawlerResult;

/// 采集到的一条原始记录
///
/// natural_key是来源侧的天然主键（如510K编号、召回编号、详情页URL），
/// 持久化层按它做幂等去重
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestRecord {
    pub natural_key: String,
    pub payload: serde_json::Value,
}

impl HarvestRecord {
    pub fn new(natural_key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            natural_key: natural_key.into(),
            payload,
        }
    }
}

/// 一个批次的落库结果
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub saved: i64,
    pub skipped: i64,
    pub failed: i64,
}

/// 采集结果持久化边界
///
/// 编排核心不关心记录存到哪里，只要求按natural_key幂等（至少一次保存语义）
#[async_trait]
pub trait HarvestStore: Send + Sync {
    async fn save_batch(
        &self,
        source: &str,
        records: &[HarvestRecord],
    ) -> CrawlerResult<BatchOutcome>;
}

/// 内存实现，用于测试和默认装配
pub struct InMemoryHarvestStore {
    seen: Mutex<HashSet<String>>,
}

impl InMemoryHarvestStore {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn record_count(&self) -> usize {
        self.seen.lock().expect("harvest store lock poisoned").len()
    }
}

impl Default for InMemoryHarvestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HarvestStore for InMemoryHarvestStore {
    async fn save_batch(
        &self,
        source: &str,
        records: &[HarvestRecord],
    ) -> CrawlerResult<BatchOutcome> {
        let mut seen = self.seen.lock().expect("harvest store lock poisoned");
        let mut outcome = BatchOutcome::default();
        for record in records {
            // 以 来源+天然主键 作为全局唯一键
            let key = format!("{}:{}", source, record.natural_key);
            if seen.insert(key) {
                outcome.saved += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        Ok(outcome)
    }
}
