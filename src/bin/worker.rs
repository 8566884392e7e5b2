//! Worker 进程入口
//!
//! 环境变量：`DATABASE_URL`（必需）。同一套二进制可以水平扩展为
//! 多个 Worker 进程，认领语义保证它们互不冲突。

use anyhow::Result;

use etl_config::AppConfig;
use etl_platform::{shutdown, AppMode, Application};

#[tokio::main]
async fn main() -> Result<()> {
    etl_platform::init_tracing();
    tracing::info!("ETL Worker 启动中...");

    if std::env::var("DATABASE_URL").map(|v| v.is_empty()).unwrap_or(true) {
        anyhow::bail!("DATABASE_URL environment variable is required");
    }

    let config = AppConfig::load(None)?;
    let token = shutdown::install_signal_handler()?;

    Application::new(config, AppMode::Worker).run(token).await
}
