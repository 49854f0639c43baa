use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use harvester_domain::{CrawlResult, CrawlerResult};

/// 爬虫执行参数统一封装
///
/// 屏蔽不同爬虫的参数差异；编排核心原样传递，只由目标爬虫解释
#[derive(Debug, Clone, Default)]
pub struct CrawlParams {
    /// 关键词列表（V1模式，保留用于向后兼容）
    pub keywords: Vec<String>,
    /// 多字段关键词配置（V2模式）：字段名 -> 关键词列表
    pub field_keywords: HashMap<String, Vec<String>>,
    /// 最大记录数（-1表示全部）
    pub max_records: i64,
    pub batch_size: i64,
    /// 开始日期（yyyyMMdd格式）
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub recent_days: Option<i64>,
    /// 连续重复批次停止阈值
    pub duplicate_batch_threshold: Option<u32>,
    /// 任务ID（用于日志关联）
    pub task_id: Option<i64>,
    pub task_name: Option<String>,
    pub is_manual: bool,
    pub triggered_by: Option<String>,
    /// 原始参数负载
    pub raw: Value,
}

impl CrawlParams {
    /// 从任务配置的参数负载构建
    ///
    /// 通用字段取顶层键；params_version为"v2"时其余数组键全部视为多字段关键词
    pub fn from_value(raw: &Value) -> Self {
        const COMMON_KEYS: [&str; 7] = [
            "maxRecords",
            "batchSize",
            "dateFrom",
            "dateTo",
            "recentDays",
            "duplicateBatchThreshold",
            "paramsVersion",
        ];

        let mut params = Self {
            max_records: raw
                .get("maxRecords")
                .and_then(Value::as_i64)
                .unwrap_or(-1),
            batch_size: raw.get("batchSize").and_then(Value::as_i64).unwrap_or(100),
            date_from: raw
                .get("dateFrom")
                .and_then(Value::as_str)
                .map(String::from),
            date_to: raw.get("dateTo").and_then(Value::as_str).map(String::from),
            recent_days: raw.get("recentDays").and_then(Value::as_i64),
            duplicate_batch_threshold: raw
                .get("duplicateBatchThreshold")
                .and_then(Value::as_u64)
                .map(|v| v as u32),
            raw: raw.clone(),
            ..Self::default()
        };

        let is_v2 = raw
            .get("paramsVersion")
            .and_then(Value::as_str)
            .is_some_and(|v| v == "v2");

        if is_v2 {
            // V2模式：除通用参数外的数组键都是多字段关键词
            if let Some(map) = raw.as_object() {
                for (key, value) in map {
                    if COMMON_KEYS.contains(&key.as_str()) {
                        continue;
                    }
                    if let Some(list) = value.as_array() {
                        let words: Vec<String> = list
                            .iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect();
                        if !words.is_empty() {
                            params.field_keywords.insert(key.clone(), words);
                        }
                    }
                }
            }
        } else if let Some(list) = raw.get("keywords").and_then(Value::as_array) {
            params.keywords = list
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
        }

        params
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn is_multi_field_mode(&self) -> bool {
        !self.field_keywords.is_empty()
    }

    /// 合并两种模式下的全部关键词
    pub fn all_keywords(&self) -> Vec<String> {
        if self.is_multi_field_mode() {
            self.field_keywords.values().flatten().cloned().collect()
        } else {
            self.keywords.clone()
        }
    }
}

/// 爬虫执行器统一接口
///
/// 所有爬虫必须实现此接口，编排核心只依赖该契约，不依赖具体实现
#[async_trait]
pub trait CrawlExecutor: Send + Sync {
    /// 爬虫名称，例如：US_510K, EU_Recall
    fn crawler_name(&self) -> &str;

    /// 数据来源国家/地区代码，例如：US, EU, KR
    fn country_code(&self) -> &str;

    /// 爬虫类型，例如：510K, RECALL, EVENT, REGISTRATION
    fn crawler_type(&self) -> &str;

    /// 唯一标识符（国家_类型）
    fn unique_key(&self) -> String {
        format!("{}_{}", self.country_code(), self.crawler_type())
    }

    fn description(&self) -> String {
        format!(
            "{}来源的{}类型数据爬虫",
            self.country_code(),
            self.crawler_type()
        )
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    /// 爬虫是否可用（外部依赖探活）
    fn is_available(&self) -> bool {
        true
    }

    /// 验证参数是否满足该爬虫的要求
    fn validate(&self, params: &CrawlParams) -> bool {
        if params.is_multi_field_mode() {
            return !params.field_keywords.is_empty();
        }
        !params.keywords.is_empty()
    }

    /// 执行爬取任务
    ///
    /// 爬虫内部可恢复的失败（单页网络错误、响应解析失败）应转换为
    /// success=false的CrawlResult返回；Err只用于无法继续的意外情况，
    /// 由执行服务统一捕获为FAILED
    async fn execute(&self, params: &CrawlParams) -> CrawlerResult<CrawlResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_from_v1_payload() {
        let raw = json!({
            "maxRecords": 500,
            "batchSize": 50,
            "dateFrom": "20250101",
            "dateTo": "20250131",
            "keywords": ["Abbott", "Medtronic"]
        });
        let params = CrawlParams::from_value(&raw);

        assert_eq!(params.max_records, 500);
        assert_eq!(params.batch_size, 50);
        assert_eq!(params.date_from.as_deref(), Some("20250101"));
        assert_eq!(params.keywords, vec!["Abbott", "Medtronic"]);
        assert!(!params.is_multi_field_mode());
        assert_eq!(params.all_keywords().len(), 2);
    }

    #[test]
    fn test_params_from_v2_payload() {
        let raw = json!({
            "paramsVersion": "v2",
            "batchSize": 100,
            "deviceNames": ["Skin Analyzer"],
            "applicants": ["Abbott", "Medtronic"]
        });
        let params = CrawlParams::from_value(&raw);

        assert!(params.is_multi_field_mode());
        assert_eq!(params.field_keywords.len(), 2);
        assert_eq!(params.all_keywords().len(), 3);
        assert!(params.keywords.is_empty());
    }

    #[test]
    fn test_params_defaults() {
        let params = CrawlParams::from_value(&json!({}));
        assert_eq!(params.max_records, -1);
        assert_eq!(params.batch_size, 100);
        assert!(params.duplicate_batch_threshold.is_none());
    }
}
