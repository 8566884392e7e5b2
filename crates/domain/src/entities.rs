//! 领域实体
//!
//! 核心领域实体定义，包含任务定义、调度计划、任务运行实例、运行日志
//! 与任务控制等业务核心概念。这些实体是系统的核心业务模型，不依赖于
//! 外部技术实现（sqlx 类型映射除外，与数据库列一一对应）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 默认的任务运行最大重试次数
pub const DEFAULT_MAX_RETRIES: i32 = 3;

// ============================================================================
// 任务定义
// ============================================================================

/// 任务定义
///
/// 表示目录中一条可复用的工作单元，参数模板中的字符串值可以包含
/// 动态日期占位符，在物化运行实例时被替换。
///
/// # 字段说明
///
/// - `id`: 任务定义的唯一标识符
/// - `name`: 任务的人类可读名称
/// - `job_type`: 任务类型，由执行器注册表路由（如 "historical_load"）
/// - `description`: 任务描述
/// - `parameters`: 参数模板，JSON 对象
/// - `is_active`: 是否启用；停用的任务不再物化新的运行实例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: i64,
    pub name: String,
    pub job_type: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobDefinition {
    pub fn is_active(&self) -> bool {
        self.is_active
    }
}

// ============================================================================
// 调度计划
// ============================================================================

/// 调度计划
///
/// 把一个任务定义绑定到一个 CRON 周期。`next_run` 只由调度器推进，
/// 且总是在运行实例物化之后才被推进，保证一次失败不会丢失已到期的
/// 调度时刻。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub job_id: i64,
    pub name: String,
    pub cron_expression: String,
    pub timezone: String,
    pub is_active: bool,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: i32,
    pub failure_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// 检查调度计划在给定时刻是否到期
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.next_run {
            Some(next_run) => self.is_active && next_run <= now,
            None => false,
        }
    }
}

// ============================================================================
// 任务运行实例
// ============================================================================

/// 任务运行状态
///
/// 状态沿允许的迁移单调推进，终态不可逆：
///
/// ```text
/// queued -> running -> completed | completed_with_errors | failed
///    ^         |
///    +---------+  （瞬时错误且未超出重试上限）
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RunStatus {
    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "completed_with_errors")]
    CompletedWithErrors,
    #[serde(rename = "failed")]
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
        }
    }

    /// 终态：一旦进入不再离开
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::CompletedWithErrors | RunStatus::Failed
        )
    }
}

// SQLx 数据库类型支持 - RunStatus
impl sqlx::Type<sqlx::Postgres> for RunStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for RunStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "completed_with_errors" => Ok(RunStatus::CompletedWithErrors),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Invalid run status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for RunStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 触发方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TriggerType {
    #[serde(rename = "scheduled")]
    Scheduled,
    #[serde(rename = "manual")]
    Manual,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Scheduled => "scheduled",
            TriggerType::Manual => "manual",
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for TriggerType {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for TriggerType {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "scheduled" => Ok(TriggerType::Scheduled),
            "manual" => Ok(TriggerType::Manual),
            _ => Err(format!("Invalid trigger type: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for TriggerType {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 错误类别
///
/// 决定重试策略：只有 `Transient` 会触发重新排队。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    #[serde(rename = "transient")]
    Transient,
    #[serde(rename = "data")]
    Data,
    #[serde(rename = "system")]
    System,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Data => "data",
            ErrorCategory::System => "system",
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for ErrorCategory {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ErrorCategory {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "transient" => Ok(ErrorCategory::Transient),
            "data" => Ok(ErrorCategory::Data),
            "system" => Ok(ErrorCategory::System),
            _ => Err(format!("Invalid error category: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for ErrorCategory {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 任务运行实例
///
/// 一次任务执行的完整记录。`runtime_parameters` 是占位符替换后的参数
/// 快照；`scheduled_for` 是本应执行的调度时刻，`started_at` 是被
/// Worker 认领的实际时刻。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: i64,
    pub job_id: i64,
    pub schedule_id: Option<i64>,
    pub name: String,
    pub status: RunStatus,
    pub trigger_type: TriggerType,
    pub scheduled_for: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub runtime_parameters: serde_json::Value,
    pub records_processed: i32,
    pub records_failed: i32,
    pub records_skipped: i32,
    pub error_message: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JobRun {
    /// 创建一个新的排队中运行实例（id 由数据库生成）
    pub fn new(
        job_id: i64,
        schedule_id: Option<i64>,
        name: String,
        trigger_type: TriggerType,
        scheduled_for: DateTime<Utc>,
        runtime_parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: 0,
            job_id,
            schedule_id,
            name,
            status: RunStatus::Queued,
            trigger_type,
            scheduled_for,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            runtime_parameters,
            records_processed: 0,
            records_failed: 0,
            records_skipped: 0,
            error_message: None,
            error_category: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            worker_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, RunStatus::Running)
    }

    /// 还有剩余的重试额度
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// 获取执行时长（秒）
    pub fn execution_duration_seconds(&self) -> Option<i64> {
        if let (Some(started), Some(completed)) = (self.started_at, self.completed_at) {
            Some((completed - started).num_seconds())
        } else {
            None
        }
    }
}

/// 执行结果统计
///
/// 执行器的返回值；终态写回由 Worker 统一完成。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub processed: i32,
    pub failed: i32,
    pub skipped: i32,
}

impl ExecutionStats {
    pub fn merge(&mut self, other: ExecutionStats) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

// ============================================================================
// 运行日志
// ============================================================================

/// 日志级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogLevel {
    #[serde(rename = "DEBUG")]
    Debug,
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "ERROR")]
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for LogLevel {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for LogLevel {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for LogLevel {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 运行日志记录（只追加，写入后不可变）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogRecord {
    pub id: i64,
    pub run_id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub context: serde_json::Value,
    pub component: String,
}

// ============================================================================
// 任务控制
// ============================================================================

/// 任务控制行（按任务名）
///
/// 当某个任务名存在 `is_paused = true` 的控制行时，该任务的运行实例
/// 不得离开排队状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobControl {
    pub job_name: String,
    pub is_paused: bool,
    pub paused_at: Option<DateTime<Utc>>,
    pub paused_by: Option<String>,
    pub pause_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// 度量数据
// ============================================================================

/// 写入时序存储的单个数据点
///
/// `(series_id, time_point, version)` 上的唯一约束是幂等写入的唯一
/// 事实来源，重复行被静默跳过。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericValue {
    pub series_id: i64,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_status_terminal() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::CompletedWithErrors.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_run_status_round_trip_strings() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::CompletedWithErrors,
            RunStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_job_run_new_defaults() {
        let scheduled_for = Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap();
        let run = JobRun::new(
            7,
            Some(3),
            "daily load - 2025-01-01 00:15".to_string(),
            TriggerType::Scheduled,
            scheduled_for,
            serde_json::json!({}),
        );

        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.retry_count, 0);
        assert_eq!(run.max_retries, DEFAULT_MAX_RETRIES);
        assert!(run.can_retry());
        assert!(run.started_at.is_none());
    }

    #[test]
    fn test_schedule_is_due() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 30, 0).unwrap();
        let schedule = Schedule {
            id: 1,
            job_id: 1,
            name: "every-15m".to_string(),
            cron_expression: "*/15 * * * *".to_string(),
            timezone: String::new(),
            is_active: true,
            next_run: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap()),
            last_run: None,
            run_count: 0,
            failure_count: 0,
            created_at: now,
            updated_at: now,
        };

        assert!(schedule.is_due(now));
        assert!(!Schedule { next_run: None, ..schedule.clone() }.is_due(now));
        assert!(!Schedule { is_active: false, ..schedule }.is_due(now));
    }
}
