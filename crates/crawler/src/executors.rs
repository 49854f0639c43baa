use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{info, warn};

use harvester_domain::{CrawlResult, CrawlerError, CrawlerResult};

use crate::duplicate_detector::{DuplicateDetector, DEFAULT_DUPLICATE_THRESHOLD};
use crate::executor::{CrawlExecutor, CrawlParams};
use crate::store::{HarvestRecord, HarvestStore};

const OPENFDA_BASE_URL: &str = "https://api.fda.gov";
/// openFDA单次请求的上限
const OPENFDA_MAX_LIMIT: i64 = 1000;
/// 相邻请求之间的间隔，避免触发来源限流
const REQUEST_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Deserialize)]
struct FdaResponse {
    meta: Option<FdaMeta>,
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FdaMeta {
    results: Option<FdaMetaResults>,
}

#[derive(Debug, Deserialize)]
struct FdaMetaResults {
    total: Option<i64>,
}

/// openFDA设备数据的通用分页爬取实现
///
/// 510K和召回爬虫只在端点、搜索字段和天然主键上有差异，分页、
/// 限流、重复批次检测和落库逻辑完全一致
struct OpenFdaCrawler {
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn HarvestStore>,
    /// API端点，例如 /device/510k.json
    endpoint: &'static str,
    /// 关键词逐一套用的搜索字段
    search_fields: &'static [&'static str],
    /// 日期范围过滤字段
    date_field: &'static str,
    /// 记录的天然主键字段（依序取第一个存在的）
    key_fields: &'static [&'static str],
}

impl OpenFdaCrawler {
    fn new(
        store: Arc<dyn HarvestStore>,
        base_url: Option<String>,
        endpoint: &'static str,
        search_fields: &'static [&'static str],
        date_field: &'static str,
        key_fields: &'static [&'static str],
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| OPENFDA_BASE_URL.to_string()),
            store,
            endpoint,
            search_fields,
            date_field,
            key_fields,
        }
    }

    async fn fetch_page(
        &self,
        search: &str,
        limit: i64,
        skip: i64,
    ) -> CrawlerResult<FdaResponse> {
        let url = format!("{}{}", self.base_url, self.endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("search", search),
                ("limit", &limit.to_string()),
                ("skip", &skip.to_string()),
            ])
            .send()
            .await
            .map_err(|e| CrawlerError::Network(format!("请求{url}失败: {e}")))?;

        // openFDA对无匹配结果返回404 NOT_FOUND，视为空页而不是错误
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(FdaResponse {
                meta: None,
                results: Vec::new(),
            });
        }
        if !response.status().is_success() {
            return Err(CrawlerError::Network(format!(
                "请求{}返回状态码: {}",
                url,
                response.status()
            )));
        }

        response
            .json::<FdaResponse>()
            .await
            .map_err(|e| CrawlerError::Network(format!("解析响应失败: {e}")))
    }

    fn natural_key(&self, record: &serde_json::Value) -> Option<String> {
        self.key_fields
            .iter()
            .find_map(|field| record.get(field).and_then(|v| v.as_str()))
            .map(String::from)
    }

    fn build_search(&self, field: &str, keyword: &str, params: &CrawlParams) -> String {
        let mut search = format!("{field}:\"{keyword}\"");
        if let (Some(from), Some(to)) = (&params.date_from, &params.date_to) {
            search = format!("{search} AND {}:[{from} TO {to}]", self.date_field);
        }
        search
    }

    /// 对单个搜索表达式做完整的分页爬取
    ///
    /// 页面级的网络/解析错误在此处局部恢复：记录后终止该表达式的分页，
    /// 不影响其余关键词
    async fn crawl_search(
        &self,
        source: &str,
        search: &str,
        params: &CrawlParams,
        detector: &mut DuplicateDetector,
    ) -> CrawlerResult<i32> {
        let batch_size = params.batch_size.clamp(1, OPENFDA_MAX_LIMIT);
        let mut skip = 0i64;
        let mut fetched = 0i64;
        let mut failed = 0i32;

        loop {
            let limit = if params.max_records < 0 {
                batch_size
            } else {
                batch_size.min(params.max_records - fetched)
            };
            if limit <= 0 {
                break;
            }

            let page = match self.fetch_page(search, limit, skip).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("搜索 '{}' 第{}页获取失败: {}", search, skip / batch_size + 1, e);
                    failed += 1;
                    break;
                }
            };

            if page.results.is_empty() {
                break;
            }

            let total = page
                .meta
                .as_ref()
                .and_then(|m| m.results.as_ref())
                .and_then(|r| r.total);

            let records: Vec<HarvestRecord> = page
                .results
                .iter()
                .filter_map(|r| {
                    self.natural_key(r)
                        .map(|key| HarvestRecord::new(key, r.clone()))
                })
                .collect();
            let page_len = page.results.len() as i64;
            let outcome = self.store.save_batch(source, &records).await?;
            failed += outcome.failed as i32;
            fetched += page_len;
            skip += limit;

            if detector.record_batch(page_len, outcome.saved) {
                info!("搜索 '{}' 触发重复批次停止信号", search);
                break;
            }
            if let Some(total) = total {
                if fetched >= total {
                    break;
                }
            }
            if params.max_records >= 0 && fetched >= params.max_records {
                break;
            }

            sleep(REQUEST_INTERVAL).await;
        }

        Ok(failed)
    }

    async fn run(&self, source: &str, params: &CrawlParams) -> CrawlerResult<CrawlResult> {
        let start = Instant::now();
        let mut keywords = params.all_keywords();
        if keywords.is_empty() {
            // 没有关键词时退化为默认搜索
            keywords.push("medical".to_string());
        }

        let threshold = params
            .duplicate_batch_threshold
            .unwrap_or(DEFAULT_DUPLICATE_THRESHOLD);
        let mut detector = DuplicateDetector::new(threshold);
        let mut failed_total = 0i32;

        'keywords: for keyword in &keywords {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                continue;
            }
            for field in self.search_fields {
                let search = self.build_search(field, keyword, params);
                info!("搜索关键词 '{}' (字段: {})", keyword, field);
                failed_total += self
                    .crawl_search(source, &search, params, &mut detector)
                    .await?;
                if detector.should_stop() {
                    break 'keywords;
                }
                detector.reset();
                sleep(REQUEST_INTERVAL).await;
            }
        }

        let message = format!(
            "爬取完成，处理关键词数: {}, {}",
            keywords.len(),
            detector.summary()
        );
        info!("{}: {}", source, message);

        let mut result = CrawlResult::success(
            message,
            detector.total_fetched() as i32,
            detector.total_saved() as i32,
            detector.total_skipped() as i32,
        );
        result.failed_count = failed_total;
        Ok(result.with_duration(start.elapsed().as_millis() as u64))
    }
}

/// 美国FDA 510K设备数据爬虫
pub struct Us510kExecutor {
    inner: OpenFdaCrawler,
}

impl Us510kExecutor {
    pub fn new(store: Arc<dyn HarvestStore>) -> Self {
        Self::with_base_url(store, None)
    }

    /// 指定API地址，测试时指向本地桩服务
    pub fn with_base_url(store: Arc<dyn HarvestStore>, base_url: Option<String>) -> Self {
        Self {
            inner: OpenFdaCrawler::new(
                store,
                base_url,
                "/device/510k.json",
                &["device_name", "applicant", "openfda.device_name"],
                "date_received",
                &["k_number"],
            ),
        }
    }
}

#[async_trait]
impl CrawlExecutor for Us510kExecutor {
    fn crawler_name(&self) -> &str {
        "US_510K"
    }
    fn country_code(&self) -> &str {
        "US"
    }
    fn crawler_type(&self) -> &str {
        "510K"
    }
    fn description(&self) -> String {
        "美国FDA 510K上市前通知数据爬虫".to_string()
    }

    async fn execute(&self, params: &CrawlParams) -> CrawlerResult<CrawlResult> {
        info!("执行US_510K爬虫，关键词数: {}", params.all_keywords().len());
        self.inner.run("US_510K", params).await
    }
}

/// 美国FDA设备召回数据爬虫
pub struct UsRecallExecutor {
    inner: OpenFdaCrawler,
}

impl UsRecallExecutor {
    pub fn new(store: Arc<dyn HarvestStore>) -> Self {
        Self::with_base_url(store, None)
    }

    pub fn with_base_url(store: Arc<dyn HarvestStore>, base_url: Option<String>) -> Self {
        Self {
            inner: OpenFdaCrawler::new(
                store,
                base_url,
                "/device/recall.json",
                &["product_description", "recalling_firm"],
                "event_date_initiated",
                &["res_event_number", "product_res_number"],
            ),
        }
    }
}

#[async_trait]
impl CrawlExecutor for UsRecallExecutor {
    fn crawler_name(&self) -> &str {
        "US_RECALL"
    }
    fn country_code(&self) -> &str {
        "US"
    }
    fn crawler_type(&self) -> &str {
        "RECALL"
    }
    fn description(&self) -> String {
        "美国FDA医疗器械召回数据爬虫".to_string()
    }

    async fn execute(&self, params: &CrawlParams) -> CrawlerResult<CrawlResult> {
        info!("执行US_RECALL爬虫，关键词数: {}", params.all_keywords().len());
        self.inner.run("US_RECALL", params).await
    }
}

/// 测试用爬虫，可编排成功/失败/Err结局和执行延迟
pub struct MockCrawlExecutor {
    country: String,
    crawler_type: String,
    outcome: MockOutcome,
    delay: Option<Duration>,
    available: bool,
    skip_validation: bool,
    invocations: AtomicUsize,
    last_params: Mutex<Option<CrawlParams>>,
}

#[derive(Clone)]
enum MockOutcome {
    Result(CrawlResult),
    Error(CrawlerError),
}

impl MockCrawlExecutor {
    pub fn succeeding(country: &str, crawler_type: &str) -> Self {
        Self::with_result(
            country,
            crawler_type,
            CrawlResult::success("mock完成", 10, 8, 2),
        )
    }

    pub fn failing(country: &str, crawler_type: &str) -> Self {
        Self::with_result(
            country,
            crawler_type,
            CrawlResult::failure("mock执行失败", "simulated crawl failure"),
        )
    }

    /// execute直接返回Err，模拟爬虫内部未恢复的意外错误
    pub fn erroring(country: &str, crawler_type: &str) -> Self {
        Self {
            outcome: MockOutcome::Error(CrawlerError::Network(
                "simulated network timeout".to_string(),
            )),
            ..Self::succeeding(country, crawler_type)
        }
    }

    pub fn with_result(country: &str, crawler_type: &str, result: CrawlResult) -> Self {
        Self {
            country: country.to_string(),
            crawler_type: crawler_type.to_string(),
            outcome: MockOutcome::Result(result),
            delay: None,
            available: true,
            skip_validation: true,
            invocations: AtomicUsize::new(0),
            last_params: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// 启用真实的参数校验（默认mock放行一切）
    pub fn strict_validation(mut self) -> Self {
        self.skip_validation = false;
        self
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<CrawlParams> {
        self.last_params
            .lock()
            .expect("mock lock poisoned")
            .clone()
    }
}

#[async_trait]
impl CrawlExecutor for MockCrawlExecutor {
    fn crawler_name(&self) -> &str {
        "mock"
    }
    fn country_code(&self) -> &str {
        &self.country
    }
    fn crawler_type(&self) -> &str {
        &self.crawler_type
    }
    fn description(&self) -> String {
        format!("{}_{} 测试爬虫", self.country, self.crawler_type)
    }
    fn is_available(&self) -> bool {
        self.available
    }

    fn validate(&self, params: &CrawlParams) -> bool {
        if self.skip_validation {
            return true;
        }
        !params.all_keywords().is_empty()
    }

    async fn execute(&self, params: &CrawlParams) -> CrawlerResult<CrawlResult> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().expect("mock lock poisoned") = Some(params.clone());

        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        match &self.outcome {
            MockOutcome::Result(result) => Ok(result.clone()),
            MockOutcome::Error(err) => Err(err.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryHarvestStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_executor_records_invocations() {
        let executor = MockCrawlExecutor::succeeding("US", "510K");
        let params = CrawlParams::from_value(&json!({"keywords": ["abbott"]}));

        let result = executor.execute(&params).await.unwrap();
        assert!(result.success);
        assert_eq!(executor.invocation_count(), 1);
        assert_eq!(
            executor.last_params().unwrap().keywords,
            vec!["abbott".to_string()]
        );
    }

    #[tokio::test]
    async fn test_mock_executor_error_outcome() {
        let executor = MockCrawlExecutor::erroring("US", "510K");
        let err = executor.execute(&CrawlParams::default()).await.unwrap_err();
        assert!(matches!(err, CrawlerError::Network(_)));
    }

    #[test]
    fn test_executor_unique_keys() {
        let store: Arc<dyn HarvestStore> = Arc::new(InMemoryHarvestStore::new());
        assert_eq!(Us510kExecutor::new(store.clone()).unique_key(), "US_510K");
        assert_eq!(UsRecallExecutor::new(store).unique_key(), "US_RECALL");
    }

    #[test]
    fn test_strict_validation_requires_keywords() {
        let executor = MockCrawlExecutor::succeeding("US", "510K").strict_validation();
        assert!(!executor.validate(&CrawlParams::default()));

        let params = CrawlParams::default().with_keywords(vec!["stent".to_string()]);
        assert!(executor.validate(&params));
    }
}
