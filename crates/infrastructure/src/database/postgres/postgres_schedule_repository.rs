use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use etl_domain::{entities::Schedule, repositories::ScheduleRepository};
use etl_errors::{EtlError, EtlResult};

pub struct PostgresScheduleRepository {
    pool: PgPool,
}

impl PostgresScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(row: &sqlx::postgres::PgRow) -> EtlResult<Schedule> {
        Ok(Schedule {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            name: row.try_get("name")?,
            cron_expression: row.try_get("cron_expression")?,
            timezone: row.try_get("timezone")?,
            is_active: row.try_get("is_active")?,
            next_run: row.try_get("next_run")?,
            last_run: row.try_get("last_run")?,
            run_count: row.try_get("run_count")?,
            failure_count: row.try_get("failure_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ScheduleRepository for PostgresScheduleRepository {
    #[instrument(skip(self), fields(now = %now))]
    async fn get_due(&self, now: DateTime<Utc>) -> EtlResult<Vec<Schedule>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.job_id, s.name, s.cron_expression, s.timezone,
                   s.is_active, s.next_run, s.last_run, s.run_count, s.failure_count,
                   s.created_at, s.updated_at
            FROM schedules s
            JOIN job_definitions j ON s.job_id = j.id
            WHERE s.is_active = TRUE
              AND j.is_active = TRUE
              AND s.next_run IS NOT NULL
              AND s.next_run <= $1
            ORDER BY s.next_run ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let schedules: EtlResult<Vec<Schedule>> = rows.iter().map(Self::row_to_schedule).collect();
        let result = schedules?;
        debug!("查询到期调度计划: {} 条", result.len());
        Ok(result)
    }

    #[instrument(skip(self), fields(schedule_id = %id))]
    async fn get_by_id(&self, id: i64) -> EtlResult<Option<Schedule>> {
        let row = sqlx::query(
            r#"
            SELECT id, job_id, name, cron_expression, timezone, is_active,
                   next_run, last_run, run_count, failure_count, created_at, updated_at
            FROM schedules
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    #[instrument(skip(self), fields(schedule_id = %id, next_run = %next_run))]
    async fn update_next_run(&self, id: i64, next_run: DateTime<Utc>) -> EtlResult<()> {
        let result = sqlx::query(
            "UPDATE schedules SET next_run = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(next_run)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EtlError::schedule_not_found(id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(schedule_id = %id))]
    async fn increment_failure_count(&self, id: i64) -> EtlResult<()> {
        sqlx::query(
            "UPDATE schedules SET failure_count = failure_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn count_active(&self) -> EtlResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM schedules s
            JOIN job_definitions j ON s.job_id = j.id
            WHERE s.is_active = TRUE AND j.is_active = TRUE
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("count")?)
    }
}
