//! ETL 平台进程装配
//!
//! 调度器与 Worker 以独立进程运行（也可以在一个进程里同时启动），
//! 全部协调通过 PostgreSQL 控制表完成。

pub mod app;
pub mod shutdown;

pub use app::{AppMode, Application};

/// 初始化 tracing 订阅器（RUST_LOG 可覆盖级别，默认 info）
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
