//! ETL 平台配置
//!
//! 配置来源优先级：TOML 配置文件 < `ETL__` 前缀环境变量 < 两个核心
//! 环境变量（`DATABASE_URL`、`SCHEDULER_CHECK_INTERVAL`）。加载后统一
//! 走校验，失败即启动失败。

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// 配置错误
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "配置校验失败: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 配置校验接口
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    /// 连接最大存活时间；到期回收，避免长连接劣化
    pub max_lifetime_seconds: u64,
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.url.is_empty() {
            return Err(ConfigError("database.url 不能为空".to_string()));
        }
        if !self.url.starts_with("postgresql://") && !self.url.starts_with("postgres://") {
            return Err(ConfigError(
                "database.url must start with postgresql:// or postgres://".to_string(),
            ));
        }
        if self.acquire_timeout_seconds == 0 || self.max_lifetime_seconds == 0 {
            return Err(ConfigError(
                "database 超时配置必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 调度循环的检查间隔（秒）
    pub check_interval_seconds: u64,
    /// 启动时数据库连接的最大重试次数
    pub startup_max_retries: u32,
    /// 调度器连接池大小（调度器不需要太多连接）
    pub pool_size: u32,
    /// 健康检查间隔（秒）
    pub health_interval_seconds: u64,
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.check_interval_seconds == 0 {
            return Err(ConfigError(
                "scheduler.check_interval_seconds 必须大于 0".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(ConfigError("scheduler.pool_size 必须大于 0".to_string()));
        }
        Ok(())
    }
}

/// Worker 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker 唯一标识；缺省时启动阶段按 `{hostname}-{uuid8}` 生成
    pub worker_id: Option<String>,
    /// 任务轮询间隔（秒）
    pub poll_interval_seconds: u64,
    /// 健康检查间隔（秒）
    pub health_interval_seconds: u64,
    /// 连续错误达到该阈值后退避
    pub max_consecutive_errors: u32,
    /// 退避时长（秒）
    pub backoff_seconds: u64,
    /// Worker 连接池大小
    pub pool_size: u32,
}

impl ConfigValidator for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError(
                "worker.poll_interval_seconds 必须大于 0".to_string(),
            ));
        }
        if self.max_consecutive_errors == 0 {
            return Err(ConfigError(
                "worker.max_consecutive_errors 必须大于 0".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(ConfigError("worker.pool_size 必须大于 0".to_string()));
        }
        Ok(())
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/etl".to_string(),
                min_connections: 2,
                acquire_timeout_seconds: 30,
                max_lifetime_seconds: 3600,
            },
            scheduler: SchedulerConfig {
                check_interval_seconds: 30,
                startup_max_retries: 10,
                pool_size: 5,
                health_interval_seconds: 30,
            },
            worker: WorkerConfig {
                worker_id: None,
                poll_interval_seconds: 5,
                health_interval_seconds: 30,
                max_consecutive_errors: 5,
                backoff_seconds: 30,
                pool_size: 10,
            },
        }
    }
}

impl AppConfig {
    /// 加载配置：可选的 TOML 文件 + 环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = AppConfig::default();

        let mut builder = ConfigBuilder::builder()
            .set_default("database.url", defaults.database.url.clone())?
            .set_default(
                "database.min_connections",
                u64::from(defaults.database.min_connections),
            )?
            .set_default(
                "database.acquire_timeout_seconds",
                defaults.database.acquire_timeout_seconds,
            )?
            .set_default(
                "database.max_lifetime_seconds",
                defaults.database.max_lifetime_seconds,
            )?
            .set_default(
                "scheduler.check_interval_seconds",
                defaults.scheduler.check_interval_seconds,
            )?
            .set_default(
                "scheduler.startup_max_retries",
                u64::from(defaults.scheduler.startup_max_retries),
            )?
            .set_default("scheduler.pool_size", u64::from(defaults.scheduler.pool_size))?
            .set_default(
                "scheduler.health_interval_seconds",
                defaults.scheduler.health_interval_seconds,
            )?
            .set_default(
                "worker.poll_interval_seconds",
                defaults.worker.poll_interval_seconds,
            )?
            .set_default(
                "worker.health_interval_seconds",
                defaults.worker.health_interval_seconds,
            )?
            .set_default(
                "worker.max_consecutive_errors",
                u64::from(defaults.worker.max_consecutive_errors),
            )?
            .set_default("worker.backoff_seconds", defaults.worker.backoff_seconds)?
            .set_default("worker.pool_size", u64::from(defaults.worker.pool_size))?;

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ETL")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.apply_core_env();
        config
            .validate()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        Ok(config)
    }

    /// 应用两个核心环境变量（优先级最高）
    fn apply_core_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = url;
            }
        }
        if let Ok(raw) = std::env::var("SCHEDULER_CHECK_INTERVAL") {
            match parse_duration_seconds(&raw) {
                Some(seconds) if seconds > 0 => {
                    self.scheduler.check_interval_seconds = seconds;
                }
                _ => {
                    warn!(
                        "无效的 SCHEDULER_CHECK_INTERVAL '{}', 使用默认值 {}s",
                        raw, self.scheduler.check_interval_seconds
                    );
                }
            }
        }
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        Ok(config)
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.database.validate()?;
        self.scheduler.validate()?;
        self.worker.validate()?;
        Ok(())
    }
}

/// 解析时长字符串为秒数
///
/// 接受 `30s` / `5m` / `1h` 形式，或不带后缀的纯秒数。
pub fn parse_duration_seconds(raw: &str) -> Option<u64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(v) = s.strip_suffix('s') {
        return v.parse::<u64>().ok();
    }
    if let Some(v) = s.strip_suffix('m') {
        return v.parse::<u64>().ok().map(|m| m * 60);
    }
    if let Some(v) = s.strip_suffix('h') {
        return v.parse::<u64>().ok().map(|h| h * 3600);
    }
    s.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.scheduler.check_interval_seconds, 30);
        assert_eq!(config.scheduler.pool_size, 5);
        assert_eq!(config.worker.poll_interval_seconds, 5);
        assert_eq!(config.worker.pool_size, 10);
        assert_eq!(config.database.max_lifetime_seconds, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_duration_seconds() {
        assert_eq!(parse_duration_seconds("30s"), Some(30));
        assert_eq!(parse_duration_seconds("5m"), Some(300));
        assert_eq!(parse_duration_seconds("1h"), Some(3600));
        assert_eq!(parse_duration_seconds("45"), Some(45));
        assert_eq!(parse_duration_seconds(""), None);
        assert_eq!(parse_duration_seconds("abc"), None);
        assert_eq!(parse_duration_seconds("1.5s"), None);
    }

    #[test]
    fn test_database_url_validation() {
        let mut config = AppConfig::default();
        config.database.url = "mysql://localhost/etl".to_string();
        assert!(config.validate().is_err());

        config.database.url = "postgres://localhost/etl".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_from_toml() {
        let toml_str = r#"
[database]
url = "postgresql://localhost/etl_test"
min_connections = 1
acquire_timeout_seconds = 10
max_lifetime_seconds = 1800

[scheduler]
check_interval_seconds = 15
startup_max_retries = 3
pool_size = 4
health_interval_seconds = 60

[worker]
poll_interval_seconds = 2
health_interval_seconds = 30
max_consecutive_errors = 5
backoff_seconds = 30
pool_size = 8
"#;

        let config = AppConfig::from_toml(toml_str).expect("Failed to parse TOML");
        assert_eq!(config.scheduler.check_interval_seconds, 15);
        assert_eq!(config.worker.pool_size, 8);
        assert!(config.worker.worker_id.is_none());
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let toml_str = r#"
[database]
url = ""
min_connections = 1
acquire_timeout_seconds = 10
max_lifetime_seconds = 1800

[scheduler]
check_interval_seconds = 0
startup_max_retries = 3
pool_size = 4
health_interval_seconds = 60

[worker]
poll_interval_seconds = 2
health_interval_seconds = 30
max_consecutive_errors = 5
backoff_seconds = 30
pool_size = 8
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }
}
