//! 应用装配
//!
//! 构建连接池与仓储，按运行模式启动调度器循环或 Worker 循环，外加
//! 各自的周期性健康检查任务。数据库在重试后仍不可达时返回错误，
//! 让进程以非零退出码终止。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use etl_config::AppConfig;
use etl_infrastructure::{
    connect_with_retry, health_check, PgRunLogger, PostgresJobRepository,
    PostgresJobRunRepository, PostgresMeasurementRepository, PostgresScheduleRepository,
};
use etl_scheduler::JobScheduler;
use etl_worker::{HistoricalLoadExecutor, RealtimeSyncExecutor, WorkerService};

/// 应用运行模式
#[derive(Debug, Clone, Copy)]
pub enum AppMode {
    /// 仅运行调度器
    Scheduler,
    /// 仅运行Worker
    Worker,
    /// 同进程运行调度器与Worker
    All,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Self {
        Self { config, mode }
    }

    /// 运行应用程序直到取消信号触发
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        match self.mode {
            AppMode::Scheduler => self.run_scheduler(token).await?,
            AppMode::Worker => self.run_worker(token).await?,
            AppMode::All => {
                let scheduler_token = token.clone();
                let worker_token = token;

                let scheduler_app = Application::new(self.config.clone(), AppMode::Scheduler);
                let worker_app = Application::new(self.config.clone(), AppMode::Worker);

                let (scheduler_result, worker_result) = tokio::join!(
                    scheduler_app.run_scheduler(scheduler_token),
                    worker_app.run_worker(worker_token),
                );
                scheduler_result?;
                worker_result?;
            }
        }

        info!("应用程序已停止");
        Ok(())
    }

    async fn run_scheduler(&self, token: CancellationToken) -> Result<()> {
        let pool = self.connect(self.config.scheduler.pool_size).await?;

        let schedule_repo = Arc::new(PostgresScheduleRepository::new(pool.clone()));
        let job_repo = Arc::new(PostgresJobRepository::new(pool.clone()));
        let run_repo = Arc::new(PostgresJobRunRepository::new(pool.clone()));

        let scheduler = JobScheduler::new(schedule_repo, job_repo, run_repo);

        let health = spawn_health_task(
            pool.clone(),
            Duration::from_secs(self.config.scheduler.health_interval_seconds),
            token.clone(),
        );

        scheduler
            .run(
                Duration::from_secs(self.config.scheduler.check_interval_seconds),
                token,
            )
            .await;

        let _ = health.await;
        pool.close().await;
        Ok(())
    }

    async fn run_worker(&self, token: CancellationToken) -> Result<()> {
        let pool = self.connect(self.config.worker.pool_size).await?;

        let job_repo = Arc::new(PostgresJobRepository::new(pool.clone()));
        let run_repo = Arc::new(PostgresJobRunRepository::new(pool.clone()));
        let measurements = Arc::new(PostgresMeasurementRepository::new(pool.clone()));
        let run_logger = Arc::new(PgRunLogger::new(pool.clone()));

        let http = reqwest::Client::new();

        let mut builder = WorkerService::builder(
            run_repo.clone(),
            job_repo,
            run_logger.clone(),
        )
        .poll_interval(Duration::from_secs(self.config.worker.poll_interval_seconds))
        .max_consecutive_errors(self.config.worker.max_consecutive_errors)
        .backoff(Duration::from_secs(self.config.worker.backoff_seconds))
        .register_executor(Arc::new(HistoricalLoadExecutor::new(
            http.clone(),
            measurements.clone(),
            run_repo,
            run_logger.clone(),
        )))
        .register_executor(Arc::new(RealtimeSyncExecutor::new(
            http,
            measurements,
            run_logger,
        )));

        if let Some(worker_id) = &self.config.worker.worker_id {
            builder = builder.worker_id(worker_id.clone());
        }
        let service = builder.build();

        let health = spawn_health_task(
            pool.clone(),
            Duration::from_secs(self.config.worker.health_interval_seconds),
            token.clone(),
        );

        service.run(token).await;

        let _ = health.await;
        pool.close().await;
        Ok(())
    }

    /// 建立连接池并应用数据库迁移
    async fn connect(&self, pool_size: u32) -> Result<PgPool> {
        let pool = connect_with_retry(
            &self.config.database,
            pool_size,
            self.config.scheduler.startup_max_retries,
        )
        .await
        .map_err(|e| {
            error!("数据库不可达: {}", e);
            anyhow::anyhow!(e.to_string())
        })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("运行数据库迁移失败")?;

        Ok(pool)
    }
}

/// 周期性数据库健康检查任务
fn spawn_health_task(
    pool: PgPool,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = health_check(&pool).await {
                        warn!("数据库健康检查失败: {}", e);
                    }
                }
                _ = token.cancelled() => break,
            }
        }
    })
}
