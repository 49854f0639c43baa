use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// 应用配置
///
/// 加载顺序：内置默认值 < 配置文件 < HARVESTER_前缀环境变量
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 形如 sqlite:data/harvester.db
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// 启动时是否自动编排已启用的定时任务
    pub auto_start: bool,
    /// openFDA接口地址覆盖，测试环境指向桩服务
    pub fda_base_url: Option<String>,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("database.url", "sqlite:data/harvester.db")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("scheduler.auto_start", true)?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix("HARVESTER")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("解析配置失败")
    }
}
