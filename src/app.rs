use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use harvester_api::{create_routes, AppState};
use harvester_crawler::{CrawlerRegistry, HarvestStore, Us510kExecutor, UsRecallExecutor};
use harvester_dispatcher::{DynamicTaskScheduler, TaskExecutionService};
use harvester_domain::{TaskConfigRepository, TaskLogRepository};
use harvester_infrastructure::{
    SqliteHarvestStore, SqliteTaskConfigRepository, SqliteTaskLogRepository,
};

use crate::config::AppConfig;

/// 主应用程序
pub struct Application {
    config: AppConfig,
    state: AppState,
    scheduler: Arc<DynamicTaskScheduler>,
}

impl Application {
    /// 装配全部组件：数据库、仓储、爬虫注册中心、执行服务和调度器
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序，数据库: {}", config.database.url);
        let pool = harvester_infrastructure::connect(&config.database.url)
            .await
            .context("初始化数据库失败")?;

        let config_repo: Arc<dyn TaskConfigRepository> =
            Arc::new(SqliteTaskConfigRepository::new(pool.clone()));
        let log_repo: Arc<dyn TaskLogRepository> =
            Arc::new(SqliteTaskLogRepository::new(pool.clone()));
        let store: Arc<dyn HarvestStore> = Arc::new(SqliteHarvestStore::new(pool));

        let registry = Arc::new(build_registry(&config, store)?);
        info!("已注册 {} 个爬虫", registry.count());

        let execution = Arc::new(TaskExecutionService::new(
            registry.clone(),
            config_repo.clone(),
            log_repo.clone(),
        ));
        let scheduler = Arc::new(DynamicTaskScheduler::new(
            config_repo.clone(),
            execution.clone(),
        ));

        let state = AppState {
            config_repo,
            log_repo,
            registry,
            scheduler: scheduler.clone(),
            execution,
        };

        Ok(Self {
            config,
            state,
            scheduler,
        })
    }

    /// 启动调度器和HTTP服务，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let recovered = self
            .state
            .execution
            .recover_orphaned_logs()
            .await
            .context("清理遗留执行日志失败")?;
        if recovered > 0 {
            info!("启动时收尾了 {} 条上次未完成的执行日志", recovered);
        }

        if self.config.scheduler.auto_start {
            let scheduled = self
                .scheduler
                .initialize()
                .await
                .context("调度器初始化失败")?;
            info!("已自动编排 {} 个定时任务", scheduled);
        } else {
            info!("自动编排已关闭，任务需通过API手动编排");
        }

        let app = create_routes(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());

        let bind_address = self.config.server.bind_address();
        let listener = TcpListener::bind(&bind_address)
            .await
            .with_context(|| format!("监听地址失败: {bind_address}"))?;
        info!("HTTP服务已启动: http://{bind_address}");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .context("HTTP服务异常退出")?;

        self.scheduler.shutdown();
        Ok(())
    }
}

/// 注册全部内置爬虫
fn build_registry(config: &AppConfig, store: Arc<dyn HarvestStore>) -> Result<CrawlerRegistry> {
    let base_url = config.scheduler.fda_base_url.clone();
    let mut registry = CrawlerRegistry::new();
    registry.register(Arc::new(Us510kExecutor::with_base_url(
        store.clone(),
        base_url.clone(),
    )))?;
    registry.register(Arc::new(UsRecallExecutor::with_base_url(store, base_url)))?;
    Ok(registry)
}
