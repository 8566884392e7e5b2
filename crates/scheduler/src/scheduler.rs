//! 调度循环
//!
//! 每个 tick：读取到期的调度计划，按 `next_run ASC` 串行处理；先物化
//! 运行实例，物化成功后才推进 `next_run`，因此任何一步失败都会让同一
//! 计划在下个 tick 重试。错过的时刻不补跑：`next_run` 从本轮的 `now`
//! 重新计算，停机后直接收敛到下一个未来的 CRON 边界。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use etl_domain::{
    entities::Schedule,
    repositories::{JobRepository, JobRunRepository, ScheduleRepository},
};
use etl_errors::EtlResult;

use crate::cron_utils::CronScheduler;
use crate::params::resolve_parameters;

/// 单轮调度统计
#[derive(Debug, Clone, Copy)]
pub struct CycleStats {
    pub runs_created: u32,
    pub schedules_processed: u32,
    pub errors: u32,
    pub last_run_time: DateTime<Utc>,
}

impl CycleStats {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            runs_created: 0,
            schedules_processed: 0,
            errors: 0,
            last_run_time: now,
        }
    }
}

/// 任务调度器
pub struct JobScheduler {
    schedule_repo: Arc<dyn ScheduleRepository>,
    job_repo: Arc<dyn JobRepository>,
    run_repo: Arc<dyn JobRunRepository>,
}

impl JobScheduler {
    pub fn new(
        schedule_repo: Arc<dyn ScheduleRepository>,
        job_repo: Arc<dyn JobRepository>,
        run_repo: Arc<dyn JobRunRepository>,
    ) -> Self {
        Self {
            schedule_repo,
            job_repo,
            run_repo,
        }
    }

    /// 执行一轮完整的调度循环
    pub async fn run_scheduling_cycle(&self, now: DateTime<Utc>) -> EtlResult<CycleStats> {
        let mut stats = CycleStats::new(now);

        let due_schedules = self.schedule_repo.get_due(now).await?;
        if due_schedules.is_empty() {
            debug!("没有到期的调度计划");
            return Ok(stats);
        }

        info!("发现 {} 个到期调度计划", due_schedules.len());

        for schedule in due_schedules {
            match self.process_schedule(&schedule, now).await {
                Ok(created) => {
                    stats.schedules_processed += 1;
                    if created {
                        stats.runs_created += 1;
                    }
                }
                Err(e) => {
                    // 单个计划失败不阻塞同一轮的其他计划；
                    // next_run 未推进，下个 tick 自动重试
                    error!("处理调度计划 {} 失败: {}", schedule.name, e);
                    stats.errors += 1;
                    if let Err(count_err) =
                        self.schedule_repo.increment_failure_count(schedule.id).await
                    {
                        warn!("更新调度计划 {} 失败计数失败: {}", schedule.id, count_err);
                    }
                }
            }
        }

        info!(
            "调度循环完成: 创建 {} 个运行实例, 处理 {} 个计划, {} 个错误",
            stats.runs_created, stats.schedules_processed, stats.errors
        );

        Ok(stats)
    }

    /// 处理单个到期的调度计划；返回是否物化了新的运行实例
    async fn process_schedule(&self, schedule: &Schedule, now: DateTime<Utc>) -> EtlResult<bool> {
        debug!(
            "处理调度计划: {} (cron: {})",
            schedule.name, schedule.cron_expression
        );

        // 防御竞态更新：再次校验确实到期
        let Some(scheduled_for) = schedule.next_run else {
            return Ok(false);
        };
        if scheduled_for > now {
            return Ok(false);
        }

        // 表达式先于物化解析：无效表达式直接失败，next_run 不被推进，
        // 问题在每个 tick 都保持可见而不是被悄悄跳过
        let cron = CronScheduler::new(&schedule.cron_expression)?;

        if !schedule.timezone.is_empty() && schedule.timezone != "UTC" {
            warn!(
                "调度计划 {} 携带时区 '{}'，当前按 UTC 求值",
                schedule.name, schedule.timezone
            );
        }

        let Some(job) = self.job_repo.get_for_schedule(schedule.id).await? else {
            warn!("调度计划 {} 没有关联的任务定义，跳过", schedule.name);
            return Ok(false);
        };
        if !job.is_active {
            warn!("任务定义 {} 已停用，跳过调度", job.name);
            return Ok(false);
        }

        let runtime_parameters = resolve_parameters(&job.parameters, scheduled_for);
        let run = self
            .run_repo
            .create_scheduled(schedule, &job, scheduled_for, runtime_parameters)
            .await?;

        info!("创建运行实例: {} (ID: {})", run.name, run.id);

        // 从本轮 now 计算下一次执行：每个计划每个 tick 至多一个实例
        match cron.next_execution_time(now) {
            Some(next_run) => {
                self.schedule_repo
                    .update_next_run(schedule.id, next_run)
                    .await?;
                debug!("调度计划 {} 的下次执行推进到 {}", schedule.name, next_run);
            }
            None => warn!("调度计划 {} 没有下一次执行时间", schedule.name),
        }

        Ok(true)
    }

    /// 以固定间隔驱动调度循环，直到取消信号触发
    pub async fn run(&self, check_interval: Duration, token: CancellationToken) {
        info!("调度器启动，检查间隔 {:?}", check_interval);

        match self.schedule_repo.count_active().await {
            Ok(count) => info!("监控 {} 个活跃调度计划", count),
            Err(e) => warn!("获取活跃调度计划数量失败: {}", e),
        }

        // 启动先跑一轮，不等第一个 tick
        if let Err(e) = self.run_scheduling_cycle(Utc::now()).await {
            error!("初始调度循环失败: {}", e);
        }

        let mut ticker = tokio::time::interval(check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_scheduling_cycle(Utc::now()).await {
                        error!("调度循环失败: {}", e);
                    }
                }
                _ = token.cancelled() => {
                    info!("调度器收到关闭信号");
                    break;
                }
            }
        }
    }
}
