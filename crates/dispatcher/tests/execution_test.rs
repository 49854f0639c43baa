mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{InMemoryTaskConfigRepository, InMemoryTaskLogRepository};
use harvester_crawler::{CrawlExecutor, CrawlerRegistry, MockCrawlExecutor};
use harvester_dispatcher::TaskExecutionService;
use harvester_domain::{
    CrawlerError, TaskConfig, TaskConfigRepository, TaskLog, TaskLogRepository, TaskLogStatus,
};

struct Fixture {
    service: TaskExecutionService,
    registry: Arc<CrawlerRegistry>,
    config_repo: Arc<InMemoryTaskConfigRepository>,
    log_repo: Arc<InMemoryTaskLogRepository>,
}

fn fixture(executors: Vec<MockCrawlExecutor>) -> Fixture {
    let mut registry = CrawlerRegistry::new();
    for executor in executors {
        registry.register(Arc::new(executor)).unwrap();
    }
    let registry = Arc::new(registry);
    let config_repo = Arc::new(InMemoryTaskConfigRepository::new());
    let log_repo = Arc::new(InMemoryTaskLogRepository::new());
    let service = TaskExecutionService::new(
        registry.clone(),
        config_repo.clone(),
        log_repo.clone(),
    );
    Fixture {
        service,
        registry,
        config_repo,
        log_repo,
    }
}

async fn seed_config(repo: &InMemoryTaskConfigRepository, crawler_name: &str) -> TaskConfig {
    let config = TaskConfig::new(
        format!("{crawler_name}测试任务"),
        crawler_name.to_string(),
        "US".to_string(),
        "510K".to_string(),
        json!({"keywords": ["stent"], "batchSize": 50}),
    );
    repo.create(&config).await.unwrap()
}

#[tokio::test]
async fn test_successful_execution_writes_log_and_stats() {
    let fx = fixture(vec![MockCrawlExecutor::succeeding("US", "510K")]);
    let config = seed_config(&fx.config_repo, "US_510K").await;

    let log = fx.service.trigger_task(config.id, "admin").await.unwrap();

    assert_eq!(log.status, TaskLogStatus::Success);
    assert_eq!(log.task_id, Some(config.id));
    assert_eq!(log.crawled_count, 10);
    assert_eq!(log.saved_count, 8);
    assert!(log.is_manual);
    assert_eq!(log.triggered_by, "admin");
    assert!(log.end_time.is_some());

    // 日志已持久化
    let stored = fx.log_repo.find_by_id(log.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskLogStatus::Success);

    // 任务统计已回写
    let config = fx.config_repo.find_by_id(config.id).await.unwrap().unwrap();
    assert_eq!(config.execution_count, 1);
    assert_eq!(config.success_count, 1);
    assert_eq!(config.failure_count, 0);
    assert_eq!(config.last_execution_status.as_deref(), Some("SUCCESS"));
}

#[tokio::test]
async fn test_failed_crawl_marks_log_failed() {
    let fx = fixture(vec![MockCrawlExecutor::failing("US", "510K")]);
    let config = seed_config(&fx.config_repo, "US_510K").await;

    let log = fx.service.trigger_task(config.id, "admin").await.unwrap();

    assert_eq!(log.status, TaskLogStatus::Failed);
    assert_eq!(
        log.error_message.as_deref(),
        Some("simulated crawl failure")
    );

    let config = fx.config_repo.find_by_id(config.id).await.unwrap().unwrap();
    assert_eq!(config.failure_count, 1);
    assert_eq!(config.last_execution_status.as_deref(), Some("FAILED"));
}

#[tokio::test]
async fn test_executor_error_is_captured_as_failed_log() {
    let fx = fixture(vec![MockCrawlExecutor::erroring("US", "510K")]);
    let config = seed_config(&fx.config_repo, "US_510K").await;

    let log = fx.service.trigger_task(config.id, "admin").await.unwrap();

    assert_eq!(log.status, TaskLogStatus::Failed);
    assert!(log.error_message.unwrap().contains("网络请求失败"));
}

#[tokio::test]
async fn test_unknown_crawler_leaves_failed_log() {
    let fx = fixture(vec![]);
    let config = seed_config(&fx.config_repo, "KR_EVENT").await;

    let log = fx.service.trigger_task(config.id, "admin").await.unwrap();

    assert_eq!(log.status, TaskLogStatus::Failed);
    assert!(log.error_message.unwrap().contains("KR_EVENT"));
}

#[tokio::test]
async fn test_disabled_crawler_is_rejected() {
    let fx = fixture(vec![MockCrawlExecutor::succeeding("US", "510K")]);
    let config = seed_config(&fx.config_repo, "US_510K").await;
    fx.registry.set_enabled("US_510K", false);

    let log = fx.service.trigger_task(config.id, "admin").await.unwrap();

    assert_eq!(log.status, TaskLogStatus::Failed);
    assert!(log.error_message.unwrap().contains("已停用"));
}

#[tokio::test]
async fn test_param_validation_failure() {
    let fx = fixture(vec![
        MockCrawlExecutor::succeeding("US", "510K").strict_validation(),
    ]);
    let mut config = TaskConfig::new(
        "无关键词任务".to_string(),
        "US_510K".to_string(),
        "US".to_string(),
        "510K".to_string(),
        json!({}),
    );
    config.keywords = None;
    let config = fx.config_repo.create(&config).await.unwrap();

    let log = fx.service.trigger_task(config.id, "admin").await.unwrap();

    assert_eq!(log.status, TaskLogStatus::Failed);
    assert!(log.error_message.unwrap().contains("参数"));
}

#[tokio::test]
async fn test_execution_timeout_marks_failed() {
    let fx = fixture(vec![
        MockCrawlExecutor::succeeding("US", "510K").with_delay(Duration::from_millis(200)),
    ]);
    let mut config = seed_config(&fx.config_repo, "US_510K").await;
    config.timeout_minutes = 0;
    let config = fx.config_repo.update(&config).await.unwrap();

    let log = fx.service.trigger_task(config.id, "admin").await.unwrap();

    assert_eq!(log.status, TaskLogStatus::Failed);
    assert!(log.error_message.unwrap().contains("超时"));
}

#[tokio::test]
async fn test_trigger_unknown_task_is_error() {
    let fx = fixture(vec![MockCrawlExecutor::succeeding("US", "510K")]);

    let err = fx.service.trigger_task(404, "admin").await.unwrap_err();
    assert!(matches!(err, CrawlerError::TaskNotFound { id: 404 }));
}

#[tokio::test]
async fn test_keywords_fall_back_to_config_column() {
    let executor = Arc::new(MockCrawlExecutor::succeeding("US", "510K"));
    let mut registry = CrawlerRegistry::new();
    registry
        .register(executor.clone() as Arc<dyn CrawlExecutor>)
        .unwrap();
    let registry = Arc::new(registry);
    let config_repo = Arc::new(InMemoryTaskConfigRepository::new());
    let log_repo = Arc::new(InMemoryTaskLogRepository::new());
    let service =
        TaskExecutionService::new(registry, config_repo.clone(), log_repo);

    let mut config = TaskConfig::new(
        "回落任务".to_string(),
        "US_510K".to_string(),
        "US".to_string(),
        "510K".to_string(),
        json!({}),
    );
    config.keywords = Some(r#"["Abbott","Medtronic"]"#.to_string());
    let config = config_repo.create(&config).await.unwrap();

    service.trigger_task(config.id, "admin").await.unwrap();

    let params = executor.last_params().unwrap();
    assert_eq!(params.keywords, vec!["Abbott", "Medtronic"]);
    assert_eq!(params.task_id, Some(config.id));
    assert!(params.is_manual);
}

#[tokio::test]
async fn test_retry_failed_spawns_new_log() {
    let fx = fixture(vec![MockCrawlExecutor::failing("US", "510K")]);
    let config = seed_config(&fx.config_repo, "US_510K").await;

    let first = fx.service.trigger_task(config.id, "admin").await.unwrap();
    assert_eq!(first.status, TaskLogStatus::Failed);

    let retried = fx.service.retry_failed(first.id, "ops").await.unwrap();
    assert_ne!(retried.id, first.id);
    assert_eq!(retried.task_id, Some(config.id));
    assert_eq!(retried.triggered_by, "ops");

    // 原日志保持不变
    let original = fx.log_repo.find_by_id(first.id).await.unwrap().unwrap();
    assert_eq!(original.status, TaskLogStatus::Failed);
}

#[tokio::test]
async fn test_retry_rejects_successful_log() {
    let fx = fixture(vec![MockCrawlExecutor::succeeding("US", "510K")]);
    let config = seed_config(&fx.config_repo, "US_510K").await;

    let log = fx.service.trigger_task(config.id, "admin").await.unwrap();
    assert_eq!(log.status, TaskLogStatus::Success);

    let err = fx.service.retry_failed(log.id, "ops").await.unwrap_err();
    assert!(matches!(err, CrawlerError::InvalidParams(_)));
}

#[tokio::test]
async fn test_retry_unknown_log_is_error() {
    let fx = fixture(vec![]);
    let err = fx.service.retry_failed(999, "ops").await.unwrap_err();
    assert!(matches!(err, CrawlerError::TaskLogNotFound { id: 999 }));
}

#[tokio::test]
async fn test_recover_orphaned_running_logs() {
    let fx = fixture(vec![]);

    // 模拟上次进程崩溃留下的RUNNING记录
    let orphan = TaskLog::begin(Some(7), "遗留任务", "US_510K", "US", false, "SCHEDULER");
    let orphan = fx.log_repo.create(&orphan).await.unwrap();

    let recovered = fx.service.recover_orphaned_logs().await.unwrap();
    assert_eq!(recovered, 1);

    let finished = fx.log_repo.find_by_id(orphan.id).await.unwrap().unwrap();
    assert_eq!(finished.status, TaskLogStatus::Failed);
    assert!(finished.end_time.is_some());
    assert_eq!(finished.error_message.as_deref(), Some("进程重启时执行尚未完成"));

    // 再次清理应无事可做
    assert_eq!(fx.service.recover_orphaned_logs().await.unwrap(), 0);
}
