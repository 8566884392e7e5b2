use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{info, instrument};

use etl_domain::{entities::JobControl, repositories::JobControlRepository};
use etl_errors::EtlResult;

pub struct PostgresJobControlRepository {
    pool: PgPool,
}

impl PostgresJobControlRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_control(row: &sqlx::postgres::PgRow) -> EtlResult<JobControl> {
        Ok(JobControl {
            job_name: row.try_get("job_name")?,
            is_paused: row.try_get("is_paused")?,
            paused_at: row.try_get("paused_at")?,
            paused_by: row.try_get("paused_by")?,
            pause_reason: row.try_get("pause_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const CONTROL_COLUMNS: &str =
    "job_name, is_paused, paused_at, paused_by, pause_reason, created_at, updated_at";

#[async_trait]
impl JobControlRepository for PostgresJobControlRepository {
    #[instrument(skip(self, reason))]
    async fn pause(&self, job_name: &str, paused_by: &str, reason: &str) -> EtlResult<()> {
        sqlx::query(
            r#"
            INSERT INTO job_control (job_name, is_paused, paused_at, paused_by, pause_reason)
            VALUES ($1, TRUE, NOW(), $2, $3)
            ON CONFLICT (job_name)
            DO UPDATE SET
                is_paused = TRUE,
                paused_at = NOW(),
                paused_by = $2,
                pause_reason = $3,
                updated_at = NOW()
            "#,
        )
        .bind(job_name)
        .bind(paused_by)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        info!("任务 {} 已暂停 (操作人: {})", job_name, paused_by);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn resume(&self, job_name: &str) -> EtlResult<()> {
        sqlx::query(
            r#"
            UPDATE job_control
            SET is_paused = FALSE,
                paused_at = NULL,
                paused_by = NULL,
                pause_reason = NULL,
                updated_at = NOW()
            WHERE job_name = $1
            "#,
        )
        .bind(job_name)
        .execute(&self.pool)
        .await?;

        info!("任务 {} 已恢复", job_name);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn is_paused(&self, job_name: &str) -> EtlResult<bool> {
        let row = sqlx::query("SELECT is_paused FROM job_control WHERE job_name = $1")
            .bind(job_name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| r.try_get::<bool, _>("is_paused"))
            .transpose()?
            .unwrap_or(false))
    }

    #[instrument(skip(self))]
    async fn get(&self, job_name: &str) -> EtlResult<Option<JobControl>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTROL_COLUMNS} FROM job_control WHERE job_name = $1"
        ))
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_control).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self) -> EtlResult<Vec<JobControl>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTROL_COLUMNS} FROM job_control ORDER BY job_name"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_control).collect()
    }
}
