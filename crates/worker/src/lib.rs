//! ETL 平台 Worker
//!
//! 从控制存储认领排队中的运行实例，按任务类型分发给执行器，写回
//! 终态并套用重试策略。多个 Worker 进程只通过数据库行协调。

pub mod categorize;
pub mod executor_registry;
pub mod executors;
pub mod service;


pub use categorize::categorize_error;
pub use executor_registry::{ExecutorRegistry, JobExecutor};
pub use executors::{HistoricalLoadExecutor, RealtimeSyncExecutor};
pub use service::{WorkerService, WorkerServiceBuilder};
