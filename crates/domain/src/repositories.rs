//! 领域仓储抽象
//!
//! 定义控制存储的数据访问接口，遵循依赖倒置原则：调度器与 Worker
//! 只依赖这些 trait，测试中用内存实现替换数据库实现。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    ErrorCategory, JobControl, JobDefinition, JobRun, NumericValue, RunStatus, Schedule,
};
use etl_errors::EtlResult;

/// 任务定义仓储抽象
///
/// 任务定义由外部创建，核心只读；停用通过 `is_active = false` 软删除。
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> EtlResult<Option<JobDefinition>>;
    async fn get_by_name(&self, name: &str) -> EtlResult<Option<JobDefinition>>;
    /// 获取某个调度计划绑定的任务定义
    async fn get_for_schedule(&self, schedule_id: i64) -> EtlResult<Option<JobDefinition>>;
}

/// 调度计划仓储抽象
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// 到期的调度计划：`is_active ∧ job.is_active ∧ next_run <= now`，
    /// 按 `next_run ASC` 排序。只读。
    async fn get_due(&self, now: DateTime<Utc>) -> EtlResult<Vec<Schedule>>;
    async fn get_by_id(&self, id: i64) -> EtlResult<Option<Schedule>>;
    /// 单行更新；与运行实例的物化分属不同事务，保证计算下次执行时间
    /// 失败时不会丢失已经物化的运行实例。
    async fn update_next_run(&self, id: i64, next_run: DateTime<Utc>) -> EtlResult<()>;
    async fn increment_failure_count(&self, id: i64) -> EtlResult<()>;
    async fn count_active(&self) -> EtlResult<i64>;
}

/// 任务运行仓储抽象
#[async_trait]
pub trait JobRunRepository: Send + Sync {
    /// 从到期的调度计划原子地物化一个排队中的运行实例：
    /// 插入运行行并递增 `schedule.run_count`、写入 `last_run`，
    /// 任一步失败则整体回滚。
    async fn create_scheduled(
        &self,
        schedule: &Schedule,
        job: &JobDefinition,
        scheduled_for: DateTime<Utc>,
        runtime_parameters: serde_json::Value,
    ) -> EtlResult<JobRun>;

    /// 认领最早排队的运行实例并标记为 running。
    ///
    /// 多个 Worker 并发调用时必须返回互不相同的行（跳过已被锁定的
    /// 行）；任务名被暂停（job_control.is_paused = true）或任务定义
    /// 停用的运行实例不会被认领。没有可认领的行时返回 `None`。
    async fn claim_next_queued(&self, worker_id: &str) -> EtlResult<Option<JobRun>>;

    async fn get_by_id(&self, id: i64) -> EtlResult<Option<JobRun>>;

    /// 写入终态（或刷新计数）。
    ///
    /// `completed_at` 仅在 `status` 为终态时写入；对同一终态负载的
    /// 重复调用必须成功且结果不变（幂等）。
    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        run_id: i64,
        status: RunStatus,
        processed: i32,
        failed: i32,
        skipped: i32,
        error_message: Option<&str>,
        error_category: Option<ErrorCategory>,
    ) -> EtlResult<()>;

    /// 批次之间的进度刷新，状态保持 running
    async fn update_progress(&self, run_id: i64, processed: i32, failed: i32) -> EtlResult<()>;

    /// 瞬时错误重试：`retry_count += 1`，状态回到 queued，
    /// 清空 worker_id 与 started_at
    async fn requeue_for_retry(&self, run_id: i64, error_message: &str) -> EtlResult<()>;

    async fn get_retry_count(&self, run_id: i64) -> EtlResult<i32>;
}

/// 任务控制仓储抽象（暂停/恢复控制面）
#[async_trait]
pub trait JobControlRepository: Send + Sync {
    /// 暂停任务名（upsert）
    async fn pause(&self, job_name: &str, paused_by: &str, reason: &str) -> EtlResult<()>;
    async fn resume(&self, job_name: &str) -> EtlResult<()>;
    async fn is_paused(&self, job_name: &str) -> EtlResult<bool>;
    async fn get(&self, job_name: &str) -> EtlResult<Option<JobControl>>;
    async fn list(&self) -> EtlResult<Vec<JobControl>>;
}

/// 时序度量存储抽象
#[async_trait]
pub trait MeasurementRepository: Send + Sync {
    /// 批量写入数据点，冲突行静默跳过；返回实际插入的行数。
    async fn insert_points(&self, values: &[NumericValue]) -> EtlResult<u64>;
}
