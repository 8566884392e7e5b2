use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use etl_domain::{entities::JobDefinition, repositories::JobRepository};
use etl_errors::EtlResult;

pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> EtlResult<JobDefinition> {
        Ok(JobDefinition {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            job_type: row.try_get("job_type")?,
            description: row.try_get("description")?,
            parameters: row.try_get("parameters")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const JOB_COLUMNS: &str =
    "id, name, job_type, description, parameters, is_active, created_at, updated_at";

#[async_trait]
impl JobRepository for PostgresJobRepository {
    #[instrument(skip(self), fields(job_id = %id))]
    async fn get_by_id(&self, id: i64) -> EtlResult<Option<JobDefinition>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job_definitions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_job(&row)?)),
            None => {
                debug!("任务定义不存在: ID {}", id);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_by_name(&self, name: &str) -> EtlResult<Option<JobDefinition>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job_definitions WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    #[instrument(skip(self), fields(schedule_id = %schedule_id))]
    async fn get_for_schedule(&self, schedule_id: i64) -> EtlResult<Option<JobDefinition>> {
        let row = sqlx::query(
            r#"
            SELECT j.id, j.name, j.job_type, j.description, j.parameters,
                   j.is_active, j.created_at, j.updated_at
            FROM job_definitions j
            JOIN schedules s ON j.id = s.job_id
            WHERE s.id = $1
            "#,
        )
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }
}
