//! 调度器进程入口
//!
//! 环境变量：`DATABASE_URL`（必需）、`SCHEDULER_CHECK_INTERVAL`
//! （可选，默认 30s）。数据库重试后仍不可达时以非零退出码终止。

use anyhow::Result;

use etl_config::AppConfig;
use etl_platform::{shutdown, AppMode, Application};

#[tokio::main]
async fn main() -> Result<()> {
    etl_platform::init_tracing();
    tracing::info!("ETL 调度器启动中...");

    if std::env::var("DATABASE_URL").map(|v| v.is_empty()).unwrap_or(true) {
        anyhow::bail!("DATABASE_URL environment variable is required");
    }

    let config = AppConfig::load(None)?;
    let token = shutdown::install_signal_handler()?;

    Application::new(config, AppMode::Scheduler).run(token).await
}
