//! Worker 服务
//!
//! 固定短间隔轮询：认领一个排队中的运行实例，分发给执行器，写回
//! 终态。执行器失败按类别套用重试策略；Worker 自身（认领/写回）的
//! 连续错误触发退避。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use etl_domain::entities::{ErrorCategory, JobDefinition, JobRun, LogLevel, RunStatus};
use etl_domain::logging::RunLogger;
use etl_domain::repositories::{JobRepository, JobRunRepository};
use etl_errors::{EtlError, EtlResult};

use crate::categorize::categorize_error;
use crate::executor_registry::ExecutorRegistry;

const COMPONENT: &str = "worker";

/// Worker服务构建器
pub struct WorkerServiceBuilder {
    worker_id: Option<String>,
    run_repo: Arc<dyn JobRunRepository>,
    job_repo: Arc<dyn JobRepository>,
    run_logger: Arc<dyn RunLogger>,
    registry: ExecutorRegistry,
    poll_interval: Duration,
    max_consecutive_errors: u32,
    backoff: Duration,
}

impl WorkerServiceBuilder {
    pub fn new(
        run_repo: Arc<dyn JobRunRepository>,
        job_repo: Arc<dyn JobRepository>,
        run_logger: Arc<dyn RunLogger>,
    ) -> Self {
        Self {
            worker_id: None,
            run_repo,
            job_repo,
            run_logger,
            registry: ExecutorRegistry::new(),
            poll_interval: Duration::from_secs(5),
            max_consecutive_errors: 5,
            backoff: Duration::from_secs(30),
        }
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn max_consecutive_errors(mut self, max_consecutive_errors: u32) -> Self {
        self.max_consecutive_errors = max_consecutive_errors;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// 注册任务执行器
    pub fn register_executor(mut self, executor: Arc<dyn crate::JobExecutor>) -> Self {
        self.registry.register(executor);
        self
    }

    pub fn build(self) -> WorkerService {
        let worker_id = self.worker_id.unwrap_or_else(generate_worker_id);
        WorkerService {
            worker_id,
            run_repo: self.run_repo,
            job_repo: self.job_repo,
            run_logger: self.run_logger,
            registry: Arc::new(self.registry),
            poll_interval: self.poll_interval,
            max_consecutive_errors: self.max_consecutive_errors,
            backoff: self.backoff,
        }
    }
}

/// 生成 Worker 标识：`{hostname}-{uuid前8位}`
fn generate_worker_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let suffix = uuid::Uuid::new_v4().to_string();
    format!("{}-{}", host, &suffix[..8])
}

/// Worker 服务
pub struct WorkerService {
    worker_id: String,
    run_repo: Arc<dyn JobRunRepository>,
    job_repo: Arc<dyn JobRepository>,
    run_logger: Arc<dyn RunLogger>,
    registry: Arc<ExecutorRegistry>,
    poll_interval: Duration,
    max_consecutive_errors: u32,
    backoff: Duration,
}

impl WorkerService {
    pub fn builder(
        run_repo: Arc<dyn JobRunRepository>,
        job_repo: Arc<dyn JobRepository>,
        run_logger: Arc<dyn RunLogger>,
    ) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(run_repo, job_repo, run_logger)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 认领并处理一个运行实例；没有可认领的实例时返回 `false`。
    ///
    /// 返回的 `Err` 只代表 Worker 自身的存储故障（认领/写回失败）；
    /// 执行器错误在内部按类别消化，不向上冒泡。
    pub async fn process_next_run(&self, token: &CancellationToken) -> EtlResult<bool> {
        let Some(run) = self.run_repo.claim_next_queued(&self.worker_id).await? else {
            return Ok(false);
        };

        let started = std::time::Instant::now();

        let job = match self.job_repo.get_by_id(run.job_id).await? {
            Some(job) => job,
            None => {
                // 定义被物理删除属于异常情况，运行实例直接判失败
                let error = EtlError::job_not_found(run.job_id);
                self.fail_run(&run, None, &error, ErrorCategory::System).await?;
                return Ok(true);
            }
        };

        info!(
            "开始执行运行实例: run_id={}, job={}, type={}, retry_count={}",
            run.id, job.name, job.job_type, run.retry_count
        );
        self.run_logger
            .job_started(run.id, &job.name, &job.job_type, &run.runtime_parameters, COMPONENT)
            .await;

        let outcome = match self.registry.get(&job.job_type) {
            Some(executor) => executor.execute(token, &run, &job).await,
            None => Err(EtlError::UnknownJobType(job.job_type.clone())),
        };

        let (processed, failed) = match &outcome {
            Ok(stats) => (stats.processed, stats.failed),
            Err(_) => (run.records_processed, run.records_failed),
        };

        match outcome {
            Ok(stats) => {
                let status = if stats.failed > 0 {
                    RunStatus::CompletedWithErrors
                } else {
                    RunStatus::Completed
                };
                self.run_repo
                    .finalize(
                        run.id,
                        status,
                        stats.processed,
                        stats.failed,
                        stats.skipped,
                        None,
                        None,
                    )
                    .await?;
                info!(
                    "运行实例完成: run_id={}, status={:?}, processed={}, failed={}",
                    run.id, status, stats.processed, stats.failed
                );
            }
            Err(e) => {
                self.handle_execution_error(&run, &job, e).await?;
            }
        }

        self.run_logger
            .job_completed(
                run.id,
                &job.name,
                processed,
                failed,
                started.elapsed().as_secs_f64(),
                COMPONENT,
            )
            .await;

        Ok(true)
    }

    /// 按错误类别套用重试策略
    async fn handle_execution_error(
        &self,
        run: &JobRun,
        job: &JobDefinition,
        error: EtlError,
    ) -> EtlResult<()> {
        let category = categorize_error(&error);
        let message = error.to_string();

        match category {
            ErrorCategory::Transient => {
                let retry_count = self.run_repo.get_retry_count(run.id).await?;
                if retry_count >= run.max_retries {
                    error!(
                        "运行实例 {} 重试次数耗尽 ({}/{}): {}",
                        run.id, retry_count, run.max_retries, message
                    );
                    self.run_logger
                        .append(
                            run.id,
                            LogLevel::Error,
                            "Max retries exceeded",
                            serde_json::json!({
                                "job_name": job.name,
                                "retry_count": retry_count,
                                "error": message,
                            }),
                            COMPONENT,
                        )
                        .await;
                    self.fail_run(run, Some(job), &error, ErrorCategory::Transient).await?;
                } else {
                    // 重新排队前递增 retry_count
                    self.run_repo.requeue_for_retry(run.id, &message).await?;
                    warn!(
                        "运行实例 {} 遇到瞬时错误，重新排队 (retry {}/{}): {}",
                        run.id,
                        retry_count + 1,
                        run.max_retries,
                        message
                    );
                    self.run_logger
                        .append(
                            run.id,
                            LogLevel::Warn,
                            "Transient error, will retry",
                            serde_json::json!({
                                "job_name": job.name,
                                "retry_count": retry_count + 1,
                                "error": message,
                            }),
                            COMPONENT,
                        )
                        .await;
                }
            }
            ErrorCategory::Data | ErrorCategory::System => {
                self.run_logger
                    .job_error(run.id, &job.name, &error, true, COMPONENT)
                    .await;
                self.fail_run(run, Some(job), &error, category).await?;
            }
        }
        Ok(())
    }

    async fn fail_run(
        &self,
        run: &JobRun,
        job: Option<&JobDefinition>,
        error: &EtlError,
        category: ErrorCategory,
    ) -> EtlResult<()> {
        let message = error.to_string();
        error!(
            "运行实例 {} 执行失败 ({}): {}",
            run.id,
            category.as_str(),
            message
        );
        if job.is_none() {
            self.run_logger
                .job_error(run.id, &run.name, error, true, COMPONENT)
                .await;
        }
        self.run_repo
            .finalize(
                run.id,
                RunStatus::Failed,
                run.records_processed,
                run.records_failed,
                run.records_skipped,
                Some(&message),
                Some(category),
            )
            .await
    }

    /// 以固定间隔驱动轮询循环，直到取消信号触发
    pub async fn run(&self, token: CancellationToken) {
        info!(
            "Worker 启动: id={}, poll_interval={:?}, executors={:?}",
            self.worker_id,
            self.poll_interval,
            self.registry.supported_types()
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut consecutive_errors = 0u32;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.process_next_run(&token).await {
                        Ok(claimed) => {
                            if consecutive_errors > 0 {
                                consecutive_errors = 0;
                            }
                            if !claimed {
                                debug!("没有可认领的运行实例");
                            }
                        }
                        Err(e) => {
                            consecutive_errors += 1;
                            error!(
                                "处理运行实例失败 (连续错误: {}): {}",
                                consecutive_errors, e
                            );
                            if consecutive_errors >= self.max_consecutive_errors {
                                error!(
                                    "连续错误达到 {} 次，退避 {:?}",
                                    consecutive_errors, self.backoff
                                );
                                tokio::select! {
                                    _ = tokio::time::sleep(self.backoff) => {}
                                    _ = token.cancelled() => break,
                                }
                                consecutive_errors = 0;
                            }
                        }
                    }
                }
                _ = token.cancelled() => {
                    info!("Worker {} 收到关闭信号", self.worker_id);
                    break;
                }
            }
        }

        info!("Worker {} 已停止", self.worker_id);
    }
}
