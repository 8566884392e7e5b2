use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument};

use etl_domain::{
    entities::{ErrorCategory, JobDefinition, JobRun, RunStatus, Schedule, TriggerType},
    repositories::JobRunRepository,
    DEFAULT_MAX_RETRIES,
};
use etl_errors::{EtlError, EtlResult};

pub struct PostgresJobRunRepository {
    pool: PgPool,
}

const RUN_COLUMNS: &str = "id, job_id, schedule_id, name, status, trigger_type, scheduled_for, \
     started_at, completed_at, duration_seconds, runtime_parameters, records_processed, \
     records_failed, records_skipped, error_message, error_category, retry_count, max_retries, \
     worker_id, created_at";

impl PostgresJobRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_run(row: &sqlx::postgres::PgRow) -> EtlResult<JobRun> {
        Ok(JobRun {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            schedule_id: row.try_get("schedule_id")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            trigger_type: row.try_get("trigger_type")?,
            scheduled_for: row.try_get("scheduled_for")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            duration_seconds: row.try_get("duration_seconds")?,
            runtime_parameters: row.try_get("runtime_parameters")?,
            records_processed: row.try_get("records_processed")?,
            records_failed: row.try_get("records_failed")?,
            records_skipped: row.try_get("records_skipped")?,
            error_message: row.try_get("error_message")?,
            error_category: row.try_get("error_category")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            worker_id: row.try_get("worker_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl JobRunRepository for PostgresJobRunRepository {
    #[instrument(skip(self, schedule, job, runtime_parameters), fields(
        schedule_id = %schedule.id,
        job_id = %job.id,
        scheduled_for = %scheduled_for,
    ))]
    async fn create_scheduled(
        &self,
        schedule: &Schedule,
        job: &JobDefinition,
        scheduled_for: DateTime<Utc>,
        runtime_parameters: serde_json::Value,
    ) -> EtlResult<JobRun> {
        let mut tx = self.pool.begin().await?;

        let run_name = format!("{} - {}", job.name, scheduled_for.format("%Y-%m-%d %H:%M"));

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO job_runs (
                job_id, schedule_id, name, status, trigger_type,
                scheduled_for, runtime_parameters, max_retries
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {RUN_COLUMNS}
            "#
        ))
        .bind(job.id)
        .bind(schedule.id)
        .bind(&run_name)
        .bind(RunStatus::Queued)
        .bind(TriggerType::Scheduled)
        .bind(scheduled_for)
        .bind(&runtime_parameters)
        .bind(DEFAULT_MAX_RETRIES)
        .fetch_one(&mut *tx)
        .await?;

        // 统计更新与运行插入同一事务，任一失败则整体回滚
        sqlx::query(
            r#"
            UPDATE schedules
            SET run_count = run_count + 1, last_run = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(schedule.id)
        .bind(scheduled_for)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let run = Self::row_to_run(&row)?;
        info!("物化运行实例: {} (ID: {})", run.name, run.id);
        Ok(run)
    }

    #[instrument(skip(self))]
    async fn claim_next_queued(&self, worker_id: &str) -> EtlResult<Option<JobRun>> {
        let mut tx = self.pool.begin().await?;

        // 行级锁 + SKIP LOCKED：并发 Worker 各自认领不同的行，
        // 暂停的任务名与停用的任务定义被排除在外
        let row = sqlx::query(
            r#"
            SELECT r.id
            FROM job_runs r
            JOIN job_definitions j ON r.job_id = j.id
            WHERE r.status = 'queued'
              AND j.is_active = TRUE
              AND NOT EXISTS (
                  SELECT 1 FROM job_control c
                  WHERE c.job_name = j.name AND c.is_paused = TRUE
              )
            ORDER BY r.created_at ASC
            LIMIT 1
            FOR UPDATE OF r SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let run_id: i64 = row.try_get("id")?;

        let claimed = sqlx::query(&format!(
            r#"
            UPDATE job_runs
            SET status = $2, started_at = NOW(), worker_id = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {RUN_COLUMNS}
            "#
        ))
        .bind(run_id)
        .bind(RunStatus::Running)
        .bind(worker_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let run = Self::row_to_run(&claimed)?;
        debug!("Worker {} 认领运行实例 {}", worker_id, run.id);
        Ok(Some(run))
    }

    #[instrument(skip(self), fields(run_id = %id))]
    async fn get_by_id(&self, id: i64) -> EtlResult<Option<JobRun>> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM job_runs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_run).transpose()
    }

    #[instrument(skip(self, error_message), fields(run_id = %run_id, status = ?status))]
    async fn finalize(
        &self,
        run_id: i64,
        status: RunStatus,
        processed: i32,
        failed: i32,
        skipped: i32,
        error_message: Option<&str>,
        error_category: Option<ErrorCategory>,
    ) -> EtlResult<()> {
        // COALESCE 保证重复写入同一终态时 completed_at / duration 不变（幂等）
        let result = sqlx::query(
            r#"
            UPDATE job_runs
            SET status = $2,
                records_processed = $3,
                records_failed = $4,
                records_skipped = $5,
                error_message = $6,
                error_category = $7,
                completed_at = CASE WHEN $8 THEN COALESCE(completed_at, NOW())
                                    ELSE completed_at END,
                duration_seconds = CASE
                    WHEN $8 THEN COALESCE(
                        duration_seconds,
                        EXTRACT(EPOCH FROM (NOW() - started_at))::INT
                    )
                    ELSE duration_seconds END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(status)
        .bind(processed)
        .bind(failed)
        .bind(skipped)
        .bind(error_message)
        .bind(error_category)
        .bind(status.is_terminal())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EtlError::run_not_found(run_id));
        }

        debug!(
            "运行实例 {} 状态写入: {:?}, processed={}, failed={}",
            run_id, status, processed, failed
        );
        Ok(())
    }

    #[instrument(skip(self), fields(run_id = %run_id))]
    async fn update_progress(&self, run_id: i64, processed: i32, failed: i32) -> EtlResult<()> {
        sqlx::query(
            r#"
            UPDATE job_runs
            SET records_processed = $2, records_failed = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(run_id)
        .bind(processed)
        .bind(failed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, error_message), fields(run_id = %run_id))]
    async fn requeue_for_retry(&self, run_id: i64, error_message: &str) -> EtlResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE job_runs
            SET status = $2,
                retry_count = retry_count + 1,
                error_message = $3,
                worker_id = NULL,
                started_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(RunStatus::Queued)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EtlError::run_not_found(run_id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(run_id = %run_id))]
    async fn get_retry_count(&self, run_id: i64) -> EtlResult<i32> {
        let row = sqlx::query("SELECT retry_count FROM job_runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get("retry_count")?),
            None => Err(EtlError::run_not_found(run_id)),
        }
    }
}
