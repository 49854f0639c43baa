use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use serde::Serialize;
use tracing::{info, warn};

use harvester_domain::{CrawlerError, CrawlerResult};

use crate::executor::CrawlExecutor;

/// 爬虫注册中心
///
/// 管理所有爬虫执行器，提供统一的查找接口。由进程入口显式构造并注入到
/// 调度器和执行服务，不使用全局单例；注册在启动时一次完成，之后只读，
/// 启用状态独立于注册关系，可在运行期翻转
pub struct CrawlerRegistry {
    /// 唯一标识 -> 爬虫执行器
    crawlers: HashMap<String, Arc<dyn CrawlExecutor>>,
    /// 按国家分组
    by_country: HashMap<String, Vec<Arc<dyn CrawlExecutor>>>,
    /// 按类型分组
    by_type: HashMap<String, Vec<Arc<dyn CrawlExecutor>>>,
    /// 启用状态：唯一标识 -> 是否启用（默认启用）
    enabled: RwLock<HashMap<String, bool>>,
}

/// 单个爬虫的注册信息摘要
#[derive(Debug, Clone, Serialize)]
pub struct CrawlerInfo {
    pub crawler_name: String,
    pub country_code: String,
    pub crawler_type: String,
    pub unique_key: String,
    pub description: String,
    pub version: String,
    pub available: bool,
    pub enabled: bool,
}

/// 注册中心统计
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatistics {
    pub total_crawlers: usize,
    pub countries_count: usize,
    pub types_count: usize,
    pub count_by_country: HashMap<String, usize>,
    pub count_by_type: HashMap<String, usize>,
}

impl CrawlerRegistry {
    pub fn new() -> Self {
        Self {
            crawlers: HashMap::new(),
            by_country: HashMap::new(),
            by_type: HashMap::new(),
            enabled: RwLock::new(HashMap::new()),
        }
    }

    /// 注册一个爬虫
    ///
    /// 唯一标识冲突时返回错误且注册表保持不变，绝不静默覆盖
    pub fn register(&mut self, executor: Arc<dyn CrawlExecutor>) -> CrawlerResult<()> {
        let key = executor.unique_key();
        if self.crawlers.contains_key(&key) {
            warn!("爬虫标识冲突，拒绝注册: {}", key);
            return Err(CrawlerError::DuplicateCrawlerKey { key });
        }

        self.by_country
            .entry(executor.country_code().to_string())
            .or_default()
            .push(executor.clone());
        self.by_type
            .entry(executor.crawler_type().to_string())
            .or_default()
            .push(executor.clone());
        self.enabled
            .write()
            .expect("registry lock poisoned")
            .insert(key.clone(), true);

        info!(
            "注册爬虫: {} ({}) - {}",
            executor.crawler_name(),
            key,
            executor.description()
        );
        self.crawlers.insert(key, executor);
        Ok(())
    }

    /// 根据唯一标识获取爬虫
    pub fn get(&self, unique_key: &str) -> Option<Arc<dyn CrawlExecutor>> {
        self.crawlers.get(unique_key).cloned()
    }

    /// 根据国家和类型获取爬虫
    pub fn get_by_country_and_type(
        &self,
        country_code: &str,
        crawler_type: &str,
    ) -> Option<Arc<dyn CrawlExecutor>> {
        self.get(&format!("{country_code}_{crawler_type}"))
    }

    pub fn get_by_country(&self, country_code: &str) -> Vec<Arc<dyn CrawlExecutor>> {
        self.by_country
            .get(country_code)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_by_type(&self, crawler_type: &str) -> Vec<Arc<dyn CrawlExecutor>> {
        self.by_type.get(crawler_type).cloned().unwrap_or_default()
    }

    pub fn all(&self) -> Vec<Arc<dyn CrawlExecutor>> {
        self.crawlers.values().cloned().collect()
    }

    pub fn contains(&self, country_code: &str, crawler_type: &str) -> bool {
        self.crawlers
            .contains_key(&format!("{country_code}_{crawler_type}"))
    }

    pub fn supported_countries(&self) -> Vec<String> {
        self.by_country.keys().cloned().collect()
    }

    pub fn supported_types(&self) -> Vec<String> {
        self.by_type.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.crawlers.len()
    }

    /// 翻转启用状态，纯元数据操作，不影响注册关系和调度器
    pub fn set_enabled(&self, unique_key: &str, enabled: bool) -> bool {
        if !self.crawlers.contains_key(unique_key) {
            warn!("爬虫不存在: {}", unique_key);
            return false;
        }
        self.enabled
            .write()
            .expect("registry lock poisoned")
            .insert(unique_key.to_string(), enabled);
        info!(
            "{}爬虫: {}",
            if enabled { "启用" } else { "停用" },
            unique_key
        );
        true
    }

    pub fn is_enabled(&self, unique_key: &str) -> bool {
        self.enabled
            .read()
            .expect("registry lock poisoned")
            .get(unique_key)
            .copied()
            .unwrap_or(true)
    }

    pub fn enabled_crawlers(&self) -> Vec<Arc<dyn CrawlExecutor>> {
        self.crawlers
            .values()
            .filter(|executor| self.is_enabled(&executor.unique_key()))
            .cloned()
            .collect()
    }

    pub fn statistics(&self) -> RegistryStatistics {
        RegistryStatistics {
            total_crawlers: self.crawlers.len(),
            countries_count: self.by_country.len(),
            types_count: self.by_type.len(),
            count_by_country: self
                .by_country
                .iter()
                .map(|(k, v)| (k.clone(), v.len()))
                .collect(),
            count_by_type: self
                .by_type
                .iter()
                .map(|(k, v)| (k.clone(), v.len()))
                .collect(),
        }
    }

    pub fn crawler_info(&self) -> Vec<CrawlerInfo> {
        let mut infos: Vec<CrawlerInfo> = self
            .crawlers
            .values()
            .map(|executor| {
                let key = executor.unique_key();
                CrawlerInfo {
                    crawler_name: executor.crawler_name().to_string(),
                    country_code: executor.country_code().to_string(),
                    crawler_type: executor.crawler_type().to_string(),
                    enabled: self.is_enabled(&key),
                    unique_key: key,
                    description: executor.description(),
                    version: executor.version().to_string(),
                    available: executor.is_available(),
                }
            })
            .collect();
        infos.sort_by(|a, b| a.unique_key.cmp(&b.unique_key));
        infos
    }
}

impl Default for CrawlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
