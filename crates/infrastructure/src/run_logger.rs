//! 运行日志接收器的 PostgreSQL 实现
//!
//! 先写当前代的 `run_logs` 表；表缺失或写入失败时降级到按同一 id
//! 键控的旧表 `job_logs`；两者都失败只在标准错误输出报告。任何
//! 失败都不会传播给调用方。

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use etl_domain::{entities::LogLevel, logging::RunLogger};

pub struct PgRunLogger {
    pool: PgPool,
}

impl PgRunLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn write_current(
        &self,
        run_id: i64,
        level: LogLevel,
        message: &str,
        context: &serde_json::Value,
        component: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO run_logs (run_id, level, message, context, component)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(run_id)
        .bind(level)
        .bind(message)
        .bind(context)
        .bind(component)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_legacy(
        &self,
        run_id: i64,
        level: LogLevel,
        message: &str,
        context: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO job_logs (batch_id, log_level, message, context)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(run_id)
        .bind(level)
        .bind(message)
        .bind(context)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RunLogger for PgRunLogger {
    async fn append(
        &self,
        run_id: i64,
        level: LogLevel,
        message: &str,
        context: serde_json::Value,
        component: &str,
    ) {
        // 时间戳附加进上下文，数据库行自身的 timestamp 由默认值写入
        let mut context = context;
        if let Some(map) = context.as_object_mut() {
            map.insert(
                "logged_at".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }

        // 镜像到进程日志，方便不查库时跟踪运行
        match level {
            LogLevel::Debug => tracing::debug!(run_id, component, "{} {}", message, context),
            LogLevel::Info => tracing::info!(run_id, component, "{} {}", message, context),
            LogLevel::Warn => tracing::warn!(run_id, component, "{} {}", message, context),
            LogLevel::Error => tracing::error!(run_id, component, "{} {}", message, context),
        }

        if let Err(current_err) = self
            .write_current(run_id, level, message, &context, component)
            .await
        {
            if let Err(legacy_err) = self.write_legacy(run_id, level, message, &context).await {
                eprintln!(
                    "Failed to write log to database (both tables): run_id={run_id}, \
                     current={current_err}, legacy={legacy_err}"
                );
            }
        }
    }
}
