use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use etl_domain::{entities::NumericValue, repositories::MeasurementRepository};
use etl_errors::EtlResult;

/// 时序度量存储
///
/// `(series_id, time_point, version)` 上的唯一约束负责去重；
/// 写入端不做任何自己的去重逻辑。
pub struct PostgresMeasurementRepository {
    pool: PgPool,
}

impl PostgresMeasurementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MeasurementRepository for PostgresMeasurementRepository {
    #[instrument(skip(self, values), fields(count = values.len()))]
    async fn insert_points(&self, values: &[NumericValue]) -> EtlResult<u64> {
        if values.is_empty() {
            return Ok(0);
        }

        let mut series_ids: Vec<i64> = Vec::with_capacity(values.len());
        let mut time_points: Vec<DateTime<Utc>> = Vec::with_capacity(values.len());
        let mut points: Vec<f64> = Vec::with_capacity(values.len());
        for v in values {
            series_ids.push(v.series_id);
            time_points.push(v.timestamp);
            points.push(v.value);
        }

        // 整批展开成一条语句；批内与批间的重复行都被 DO NOTHING 吸收
        let result = sqlx::query(
            r#"
            INSERT INTO numeric_values (series_id, time_point, value)
            SELECT * FROM UNNEST($1::BIGINT[], $2::TIMESTAMPTZ[], $3::DOUBLE PRECISION[])
            ON CONFLICT (series_id, time_point, version) DO NOTHING
            "#,
        )
        .bind(&series_ids)
        .bind(&time_points)
        .bind(&points)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected();
        debug!("写入数据点: {} 条提交, {} 条实际插入", values.len(), inserted);
        Ok(inserted)
    }
}
