//! 内置执行器
//!
//! - `historical_load`：按序列分页拉取历史数据，逐页写入时序存储
//! - `realtime_sync`：每个序列拉取一个实时点，单次扫描
//!
//! 两者都依赖 `(series_id, time_point, version)` 唯一约束实现幂等
//! 摄入，自己不做任何去重。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use etl_domain::entities::{ExecutionStats, JobDefinition, JobRun, LogLevel, NumericValue};
use etl_domain::logging::RunLogger;
use etl_domain::repositories::{JobRunRepository, MeasurementRepository};
use etl_errors::{error_chain, EtlError, EtlResult};

use crate::executor_registry::JobExecutor;

const COMPONENT: &str = "worker";
const DEFAULT_BATCH_SIZE: i64 = 1000;

/// 上游测点
#[derive(Debug, Clone, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub series_id: i64,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
}

impl DataPoint {
    fn to_numeric_value(&self) -> NumericValue {
        NumericValue {
            series_id: self.series_id,
            timestamp: self.timestamp,
            value: self.value,
        }
    }
}

/// 历史数据分页响应
#[derive(Debug, Deserialize)]
struct HistoricalPage {
    data: Vec<DataPoint>,
    total_count: i64,
    has_more: bool,
}

// ============================================================================
// 参数提取
// ============================================================================

fn require_str(params: &serde_json::Value, key: &str) -> EtlResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| EtlError::invalid_params(format!("missing or invalid {key} parameter")))
}

fn require_series_ids(params: &serde_json::Value) -> EtlResult<Vec<i64>> {
    let raw = params
        .get("series_ids")
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            EtlError::invalid_params("missing or invalid series_ids parameter".to_string())
        })?;
    Ok(raw.iter().filter_map(|v| v.as_i64()).collect())
}

fn optional_i64(params: &serde_json::Value, key: &str, default: i64) -> i64 {
    params.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> EtlResult<T> {
    let response = http
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| EtlError::Network(error_chain(&e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EtlError::Http {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| EtlError::Serialization(error_chain(&e)))
}

// ============================================================================
// 历史批量加载
// ============================================================================

/// 历史数据批量加载执行器（job_type = "historical_load"）
pub struct HistoricalLoadExecutor {
    http: reqwest::Client,
    measurements: Arc<dyn MeasurementRepository>,
    runs: Arc<dyn JobRunRepository>,
    run_logger: Arc<dyn RunLogger>,
}

impl HistoricalLoadExecutor {
    pub fn new(
        http: reqwest::Client,
        measurements: Arc<dyn MeasurementRepository>,
        runs: Arc<dyn JobRunRepository>,
        run_logger: Arc<dyn RunLogger>,
    ) -> Self {
        Self {
            http,
            measurements,
            runs,
            run_logger,
        }
    }

    /// 单个序列的分页加载
    ///
    /// 拉取失败中断本次执行并向上抛出（交给错误分类决定是否重试）；
    /// 单页写入失败只计入 failed，继续下一页。
    async fn load_series(
        &self,
        token: &CancellationToken,
        run: &JobRun,
        source_url: &str,
        series_id: i64,
        start_date: &str,
        end_date: &str,
        batch_size: i64,
    ) -> EtlResult<(ExecutionStats, i64)> {
        let mut stats = ExecutionStats::default();
        let mut total_count = 0i64;
        let mut page = 1i64;
        let mut has_more = true;

        while has_more {
            if token.is_cancelled() {
                return Err(EtlError::Cancelled);
            }

            debug!(
                "拉取历史数据页: series_id={}, page={}, run_id={}",
                series_id, page, run.id
            );

            let response: HistoricalPage = fetch_json(
                &self.http,
                source_url,
                &[
                    ("series_id", series_id.to_string()),
                    ("start_date", start_date.to_string()),
                    ("end_date", end_date.to_string()),
                    ("page", page.to_string()),
                    ("limit", batch_size.to_string()),
                ],
            )
            .await?;

            total_count = response.total_count;
            let values: Vec<NumericValue> =
                response.data.iter().map(DataPoint::to_numeric_value).collect();
            let page_len = values.len() as i32;

            match self.measurements.insert_points(&values).await {
                Ok(inserted) => {
                    stats.processed += page_len;
                    self.run_logger
                        .append(
                            run.id,
                            LogLevel::Info,
                            "Inserted records successfully",
                            json!({
                                "series_id": series_id,
                                "page": page,
                                "batch_size": page_len,
                                "records_inserted": inserted,
                            }),
                            COMPONENT,
                        )
                        .await;
                }
                Err(e) => {
                    stats.failed += page_len;
                    self.run_logger
                        .append(
                            run.id,
                            LogLevel::Error,
                            "Failed to insert batch",
                            json!({
                                "series_id": series_id,
                                "page": page,
                                "batch_size": page_len,
                                "error": e.to_string(),
                            }),
                            COMPONENT,
                        )
                        .await;
                }
            }

            has_more = response.has_more;
            page += 1;
        }

        Ok((stats, total_count))
    }
}

#[async_trait]
impl JobExecutor for HistoricalLoadExecutor {
    fn name(&self) -> &'static str {
        "historical_load"
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        run: &JobRun,
        job: &JobDefinition,
    ) -> EtlResult<ExecutionStats> {
        let params = &run.runtime_parameters;
        let source_url = require_str(params, "source_url")?;
        let start_date = require_str(params, "start_date")?;
        let end_date = require_str(params, "end_date")?;
        let series_ids = require_series_ids(params)?;
        let batch_size = optional_i64(params, "batch_size", DEFAULT_BATCH_SIZE);

        info!(
            "开始历史数据加载: run_id={}, series={:?}, {} ~ {}",
            run.id, series_ids, start_date, end_date
        );

        let mut stats = ExecutionStats::default();
        let mut expected_total = 0i64;

        for series_id in series_ids {
            if token.is_cancelled() {
                return Err(EtlError::Cancelled);
            }

            let (series_stats, total_count) = self
                .load_series(
                    token,
                    run,
                    &source_url,
                    series_id,
                    &start_date,
                    &end_date,
                    batch_size,
                )
                .await?;
            stats.merge(series_stats);
            expected_total += total_count;

            // 批次检查点：让状态页反映部分进度
            if let Err(e) = self
                .runs
                .update_progress(run.id, stats.processed, stats.failed)
                .await
            {
                warn!("更新运行进度失败: run_id={}, {}", run.id, e);
            }
            self.run_logger
                .job_progress(
                    run.id,
                    &job.name,
                    stats.processed,
                    stats.failed,
                    expected_total as i32,
                    COMPONENT,
                )
                .await;
        }

        info!(
            "历史数据加载完成: run_id={}, processed={}, failed={}",
            run.id, stats.processed, stats.failed
        );
        Ok(stats)
    }
}

// ============================================================================
// 实时同步
// ============================================================================

/// 实时同步执行器（job_type = "realtime_sync"）
///
/// 每次运行只做一次扫描；周期性重复来自调度器的再物化，而不是
/// 执行器内部循环。`sync_interval` 参数只作记录用途。
pub struct RealtimeSyncExecutor {
    http: reqwest::Client,
    measurements: Arc<dyn MeasurementRepository>,
    run_logger: Arc<dyn RunLogger>,
}

impl RealtimeSyncExecutor {
    pub fn new(
        http: reqwest::Client,
        measurements: Arc<dyn MeasurementRepository>,
        run_logger: Arc<dyn RunLogger>,
    ) -> Self {
        Self {
            http,
            measurements,
            run_logger,
        }
    }

    async fn sync_series(&self, source_url: &str, series_id: i64) -> EtlResult<()> {
        let point: DataPoint = fetch_json(
            &self.http,
            source_url,
            &[("series_id", series_id.to_string())],
        )
        .await?;

        self.measurements
            .insert_points(&[point.to_numeric_value()])
            .await?;

        debug!(
            "写入实时数据点: series_id={}, value={}, timestamp={}",
            series_id, point.value, point.timestamp
        );
        Ok(())
    }
}

#[async_trait]
impl JobExecutor for RealtimeSyncExecutor {
    fn name(&self) -> &'static str {
        "realtime_sync"
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        run: &JobRun,
        _job: &JobDefinition,
    ) -> EtlResult<ExecutionStats> {
        let params = &run.runtime_parameters;
        let source_url = require_str(params, "source_url")?;
        let series_ids = require_series_ids(params)?;
        let sync_interval = optional_i64(params, "sync_interval", 30);

        info!(
            "开始实时同步: run_id={}, series={:?}, sync_interval={}s",
            run.id, series_ids, sync_interval
        );

        let mut stats = ExecutionStats::default();

        for series_id in series_ids {
            if token.is_cancelled() {
                return Err(EtlError::Cancelled);
            }

            match self.sync_series(&source_url, series_id).await {
                Ok(()) => stats.processed += 1,
                Err(e) => {
                    stats.failed += 1;
                    self.run_logger
                        .append(
                            run.id,
                            LogLevel::Error,
                            "Failed to sync series",
                            json!({ "series_id": series_id, "error": e.to_string() }),
                            COMPONENT,
                        )
                        .await;
                }
            }
        }

        info!(
            "实时同步完成: run_id={}, processed={}, failed={}",
            run.id, stats.processed, stats.failed
        );
        Ok(stats)
    }
}
