//! ETL 平台基础设施层
//!
//! 控制存储的 PostgreSQL 实现、带重试的连接池管理以及运行日志
//! 接收器。认领语义依赖 `FOR UPDATE SKIP LOCKED`，因此只提供
//! PostgreSQL 后端。

pub mod database;
pub mod run_logger;

pub use database::manager::{connect_with_retry, health_check, mask_database_url};
pub use database::postgres::{
    PostgresJobControlRepository, PostgresJobRepository, PostgresJobRunRepository,
    PostgresMeasurementRepository, PostgresScheduleRepository,
};
pub use run_logger::PgRunLogger;
