//! ETL 平台领域层
//!
//! 定义任务定义、调度计划、任务运行与日志等核心业务实体，
//! 以及控制存储的仓储抽象。所有跨进程协调都通过这些抽象背后的
//! 数据库行完成，调度器与 Worker 之间没有进程内消息传递。

pub mod entities;
pub mod logging;
pub mod repositories;

pub use entities::*;
pub use logging::RunLogger;
pub use repositories::{
    JobControlRepository, JobRepository, JobRunRepository, MeasurementRepository,
    ScheduleRepository,
};
