//! CRON 表达式解析与求值
//!
//! 只接受标准 5 字段表达式（分 时 日 月 周），分钟分辨率；秒字段
//! 不被接受。求值是纯函数：给定时刻，结果确定。

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use tracing::warn;

use etl_errors::{EtlError, EtlResult};

/// CRON 调度求值器
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 解析 5 字段 CRON 表达式
    ///
    /// 底层解析器要求秒字段，这里固定补 `0`，对外仍然只暴露
    /// 分钟分辨率的语义。
    pub fn new(cron_expr: &str) -> EtlResult<Self> {
        let fields: Vec<&str> = cron_expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(EtlError::InvalidCron {
                expr: cron_expr.to_string(),
                message: format!("expected 5 fields, got {}", fields.len()),
            });
        }

        let with_seconds = format!("0 {}", fields.join(" "));
        let schedule = Schedule::from_str(&with_seconds).map_err(|e| EtlError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 获取严格晚于 `from` 的下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 检查给定时刻是否应该触发
    ///
    /// 有上次执行时间时：`next(last_run) <= now`；从未执行过时，
    /// 从一分钟前开始找，避免错过恰好落在当前分钟的时刻。
    pub fn is_due(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let check_from = match last_run {
            Some(last) => last,
            None => now - Duration::minutes(1),
        };
        match self.schedule.after(&check_from).next() {
            Some(next_time) => next_time <= now,
            None => {
                warn!("无法计算下一次执行时间");
                false
            }
        }
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> EtlResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}
