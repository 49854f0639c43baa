mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{InMemoryTaskConfigRepository, InMemoryTaskLogRepository};
use harvester_crawler::{CrawlerRegistry, MockCrawlExecutor};
use harvester_dispatcher::{DynamicTaskScheduler, TaskExecutionService};
use harvester_domain::{CrawlerError, TaskConfig, TaskConfigRepository, TaskLogRepository};

struct Fixture {
    scheduler: DynamicTaskScheduler,
    config_repo: Arc<InMemoryTaskConfigRepository>,
    log_repo: Arc<InMemoryTaskLogRepository>,
}

fn fixture() -> Fixture {
    let mut registry = CrawlerRegistry::new();
    registry
        .register(Arc::new(MockCrawlExecutor::succeeding("US", "510K")))
        .unwrap();
    let config_repo = Arc::new(InMemoryTaskConfigRepository::new());
    let log_repo = Arc::new(InMemoryTaskLogRepository::new());
    let execution = Arc::new(TaskExecutionService::new(
        Arc::new(registry),
        config_repo.clone(),
        log_repo.clone(),
    ));
    Fixture {
        scheduler: DynamicTaskScheduler::new(config_repo.clone(), execution),
        config_repo,
        log_repo,
    }
}

async fn seed_config(repo: &InMemoryTaskConfigRepository, cron: Option<&str>) -> TaskConfig {
    let mut config = TaskConfig::new(
        "定时采集任务".to_string(),
        "US_510K".to_string(),
        "US".to_string(),
        "510K".to_string(),
        json!({"keywords": ["stent"]}),
    );
    config.cron_expression = cron.map(String::from);
    repo.create(&config).await.unwrap()
}

#[tokio::test]
async fn test_schedule_and_cancel() {
    let fx = fixture();
    let config = seed_config(&fx.config_repo, Some("0 2 * * *")).await;

    fx.scheduler.schedule_task(&config).await.unwrap();
    assert!(fx.scheduler.is_scheduled(config.id));
    assert_eq!(fx.scheduler.scheduled_task_ids(), vec![config.id]);

    // 下次执行时间已回写
    let stored = fx.config_repo.find_by_id(config.id).await.unwrap().unwrap();
    assert!(stored.next_execution_time.is_some());

    assert!(fx.scheduler.cancel_task(config.id));
    assert!(!fx.scheduler.is_scheduled(config.id));
    // 重复取消返回false
    assert!(!fx.scheduler.cancel_task(config.id));
}

#[tokio::test]
async fn test_schedule_is_idempotent() {
    let fx = fixture();
    let config = seed_config(&fx.config_repo, Some("0 2 * * *")).await;

    fx.scheduler.schedule_task(&config).await.unwrap();
    fx.scheduler.schedule_task(&config).await.unwrap();

    assert_eq!(fx.scheduler.scheduled_count(), 1);
}

#[tokio::test]
async fn test_invalid_cron_rejected_without_side_effects() {
    let fx = fixture();
    let valid = seed_config(&fx.config_repo, Some("0 2 * * *")).await;
    fx.scheduler.schedule_task(&valid).await.unwrap();

    // 用无效表达式重新编排失败，原编排保持
    let mut broken = valid.clone();
    broken.cron_expression = Some("not a cron".to_string());
    let err = fx.scheduler.schedule_task(&broken).await.unwrap_err();
    assert!(matches!(err, CrawlerError::InvalidCron { .. }));
    assert!(fx.scheduler.is_scheduled(valid.id));
}

#[tokio::test]
async fn test_schedule_without_cron_is_error() {
    let fx = fixture();
    let config = seed_config(&fx.config_repo, None).await;

    let err = fx.scheduler.schedule_task(&config).await.unwrap_err();
    assert!(matches!(err, CrawlerError::InvalidParams(_)));
    assert!(!fx.scheduler.is_scheduled(config.id));
}

#[tokio::test]
async fn test_pause_and_resume_round_trip() {
    let fx = fixture();
    let config = seed_config(&fx.config_repo, Some("0 2 * * *")).await;
    fx.scheduler.schedule_task(&config).await.unwrap();

    assert!(fx.scheduler.pause_task(config.id));
    assert!(fx.scheduler.is_paused(config.id));
    assert!(!fx.scheduler.is_scheduled(config.id));

    assert!(fx.scheduler.resume_task(config.id).await.unwrap());
    assert!(fx.scheduler.is_scheduled(config.id));
    assert!(!fx.scheduler.is_paused(config.id));

    // 未暂停的任务无法恢复
    assert!(!fx.scheduler.resume_task(config.id).await.unwrap());
    // 未编排的任务无法暂停
    assert!(!fx.scheduler.pause_task(999));
}

#[tokio::test]
async fn test_resume_skips_disabled_task() {
    let fx = fixture();
    let config = seed_config(&fx.config_repo, Some("0 2 * * *")).await;
    fx.scheduler.schedule_task(&config).await.unwrap();
    fx.scheduler.pause_task(config.id);

    let mut disabled = config.clone();
    disabled.enabled = false;
    fx.config_repo.update(&disabled).await.unwrap();

    assert!(!fx.scheduler.resume_task(config.id).await.unwrap());
    assert!(!fx.scheduler.is_scheduled(config.id));
}

#[tokio::test]
async fn test_initialize_skips_broken_and_unscheduled_tasks() {
    let fx = fixture();
    let valid = seed_config(&fx.config_repo, Some("0 2 * * *")).await;
    let broken = seed_config(&fx.config_repo, Some("59 61 * * *")).await;
    let manual_only = seed_config(&fx.config_repo, None).await;
    let mut disabled = seed_config(&fx.config_repo, Some("0 3 * * *")).await;
    disabled.enabled = false;
    fx.config_repo.update(&disabled).await.unwrap();

    let scheduled = fx.scheduler.initialize().await.unwrap();

    assert_eq!(scheduled, 1);
    assert!(fx.scheduler.is_scheduled(valid.id));
    assert!(!fx.scheduler.is_scheduled(broken.id));
    assert!(!fx.scheduler.is_scheduled(manual_only.id));
    assert!(!fx.scheduler.is_scheduled(disabled.id));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timer_fires_and_writes_log() {
    let fx = fixture();
    // 秒级表达式，确保测试窗口内至少触发一次
    let config = seed_config(&fx.config_repo, Some("* * * * * *")).await;
    fx.scheduler.schedule_task(&config).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    fx.scheduler.cancel_task(config.id);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let logs = fx.log_repo.find_by_task_id(config.id, 10).await.unwrap();
    assert!(!logs.is_empty(), "定时循环应至少触发一次执行");
    assert_eq!(logs[0].triggered_by, "SCHEDULER");
    assert!(!logs[0].is_manual);

    let stored = fx.config_repo.find_by_id(config.id).await.unwrap().unwrap();
    assert!(stored.execution_count >= 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disabled_task_is_skipped_at_fire_time() {
    let fx = fixture();
    let config = seed_config(&fx.config_repo, Some("* * * * * *")).await;
    fx.scheduler.schedule_task(&config).await.unwrap();

    // 编排之后停用：定时器仍在，但触发时重读配置后跳过
    let mut disabled = config.clone();
    disabled.enabled = false;
    fx.config_repo.update(&disabled).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    fx.scheduler.shutdown();

    let logs = fx.log_repo.find_by_task_id(config.id, 10).await.unwrap();
    assert!(logs.is_empty(), "停用的任务不应产生执行日志");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_schedule_keeps_single_timer() {
    let fx = fixture();
    let config = seed_config(&fx.config_repo, Some("* * * * * *")).await;
    let scheduler = Arc::new(fx.scheduler);

    // 并发重复编排同一任务，回写await处会交错
    let mut handles = Vec::new();
    for _ in 0..32 {
        let scheduler = scheduler.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            scheduler.schedule_task(&config).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(scheduler.scheduled_count(), 1);

    // 取消之后不应残留任何仍在触发的定时循环
    assert!(scheduler.cancel_task(config.id));
    assert_eq!(scheduler.scheduled_count(), 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let before = fx.log_repo.find_by_task_id(config.id, 100).await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(2600)).await;
    let after = fx.log_repo.find_by_task_id(config.id, 100).await.unwrap().len();
    assert_eq!(before, after, "取消编排后不应再产生新的执行日志");
}

#[tokio::test]
async fn test_shutdown_clears_all_timers() {
    let fx = fixture();
    let a = seed_config(&fx.config_repo, Some("0 2 * * *")).await;
    let b = seed_config(&fx.config_repo, Some("0 3 * * *")).await;
    fx.scheduler.schedule_task(&a).await.unwrap();
    fx.scheduler.schedule_task(&b).await.unwrap();
    fx.scheduler.pause_task(b.id);

    fx.scheduler.shutdown();

    assert_eq!(fx.scheduler.scheduled_count(), 0);
    assert_eq!(fx.scheduler.paused_count(), 0);
}
