//! 测试工具
//!
//! 仓储 trait 的内存实现与测试数据构造器，让调度器与 Worker 的
//! 单元测试不需要真实数据库。

pub mod builders;
pub mod mocks;

pub use builders::{JobDefinitionBuilder, JobRunBuilder, ScheduleBuilder};
pub use mocks::{
    MemoryRunLogger, MockJobControlRepository, MockJobRepository, MockJobRunRepository,
    MockMeasurementRepository, MockScheduleRepository,
};
