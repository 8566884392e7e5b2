//! 运行日志接收器抽象
//!
//! 按运行实例追加结构化、分级的日志记录。写入从调用方视角永不失败：
//! 实现内部负责降级（备用表、标准错误输出），调用方的运行流程不受
//! 日志故障影响。

use async_trait::async_trait;
use serde_json::json;

use crate::entities::LogLevel;
use etl_errors::EtlError;

/// 运行日志接收器
///
/// 生命周期事件（JOB_STARTED / JOB_PROGRESS / JOB_COMPLETED /
/// JOB_ERROR）是契约的一部分，由默认方法统一构造上下文格式。
#[async_trait]
pub trait RunLogger: Send + Sync {
    /// 追加一条日志记录。时间戳由实现自动附加；永不向调用方抛错。
    async fn append(
        &self,
        run_id: i64,
        level: LogLevel,
        message: &str,
        context: serde_json::Value,
        component: &str,
    );

    /// 认领成功后记录任务启动
    async fn job_started(
        &self,
        run_id: i64,
        job_name: &str,
        job_type: &str,
        parameters: &serde_json::Value,
        component: &str,
    ) {
        self.append(
            run_id,
            LogLevel::Info,
            "JOB_STARTED",
            json!({
                "job_name": job_name,
                "job_type": job_type,
                "parameters": parameters,
                "event": "job_start",
            }),
            component,
        )
        .await;
    }

    /// 执行器在批次检查点记录进度
    async fn job_progress(
        &self,
        run_id: i64,
        job_name: &str,
        processed: i32,
        failed: i32,
        total: i32,
        component: &str,
    ) {
        let progress_percent = if total > 0 {
            f64::from(processed) / f64::from(total) * 100.0
        } else {
            0.0
        };
        self.append(
            run_id,
            LogLevel::Info,
            "JOB_PROGRESS",
            json!({
                "job_name": job_name,
                "records_processed": processed,
                "records_failed": failed,
                "total_records": total,
                "progress_percent": progress_percent,
                "event": "job_progress",
            }),
            component,
        )
        .await;
    }

    /// 终态迁移时记录完成（无论成败都会记录）
    async fn job_completed(
        &self,
        run_id: i64,
        job_name: &str,
        processed: i32,
        failed: i32,
        duration_seconds: f64,
        component: &str,
    ) {
        self.append(
            run_id,
            LogLevel::Info,
            "JOB_COMPLETED",
            json!({
                "job_name": job_name,
                "records_processed": processed,
                "records_failed": failed,
                "duration_seconds": duration_seconds,
                "event": "job_complete",
            }),
            component,
        )
        .await;
    }

    /// 记录执行失败；非瞬时类别附带调用栈
    async fn job_error(
        &self,
        run_id: i64,
        job_name: &str,
        error: &EtlError,
        with_backtrace: bool,
        component: &str,
    ) {
        if with_backtrace {
            let backtrace = std::backtrace::Backtrace::force_capture();
            self.append(
                run_id,
                LogLevel::Error,
                &format!("JOB_ERROR: {job_name}"),
                json!({
                    "error": error.to_string(),
                    "stack_trace": backtrace.to_string(),
                }),
                component,
            )
            .await;
        } else {
            self.append(
                run_id,
                LogLevel::Error,
                "JOB_ERROR",
                json!({
                    "job_name": job_name,
                    "error": error.to_string(),
                    "event": "job_error",
                }),
                component,
            )
            .await;
        }
    }
}
