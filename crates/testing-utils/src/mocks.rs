//! 仓储 trait 的内存 Mock 实现
//!
//! 通过 `Arc<Mutex<...>>` 共享状态：运行仓储在认领时需要看到任务
//! 定义的启用状态与任务控制的暂停标记，构造时把对应的底层映射
//! 传进来即可，和数据库里的连接查询等价。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use etl_domain::entities::{
    ErrorCategory, JobControl, JobDefinition, JobRun, LogLevel, NumericValue, RunLogRecord,
    RunStatus, Schedule, TriggerType,
};
use etl_domain::logging::RunLogger;
use etl_domain::repositories::{
    JobControlRepository, JobRepository, JobRunRepository, MeasurementRepository,
    ScheduleRepository,
};
use etl_domain::DEFAULT_MAX_RETRIES;
use etl_errors::{EtlError, EtlResult};

// ============================================================================
// 任务定义
// ============================================================================

#[derive(Clone, Default)]
pub struct MockJobRepository {
    jobs: Arc<Mutex<HashMap<i64, JobDefinition>>>,
    schedule_bindings: Arc<Mutex<HashMap<i64, i64>>>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: JobDefinition) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    /// 绑定调度计划到任务定义（等价于数据库里的外键连接）
    pub fn bind_schedule(&self, schedule_id: i64, job_id: i64) {
        self.schedule_bindings
            .lock()
            .unwrap()
            .insert(schedule_id, job_id);
    }

    pub(crate) fn shared_jobs(&self) -> Arc<Mutex<HashMap<i64, JobDefinition>>> {
        Arc::clone(&self.jobs)
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn get_by_id(&self, id: i64) -> EtlResult<Option<JobDefinition>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> EtlResult<Option<JobDefinition>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .find(|j| j.name == name)
            .cloned())
    }

    async fn get_for_schedule(&self, schedule_id: i64) -> EtlResult<Option<JobDefinition>> {
        let job_id = self
            .schedule_bindings
            .lock()
            .unwrap()
            .get(&schedule_id)
            .copied();
        match job_id {
            Some(id) => Ok(self.jobs.lock().unwrap().get(&id).cloned()),
            None => Ok(None),
        }
    }
}

// ============================================================================
// 调度计划
// ============================================================================

#[derive(Clone, Default)]
pub struct MockScheduleRepository {
    schedules: Arc<Mutex<HashMap<i64, Schedule>>>,
}

impl MockScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, schedule: Schedule) {
        self.schedules.lock().unwrap().insert(schedule.id, schedule);
    }

    pub fn get(&self, id: i64) -> Option<Schedule> {
        self.schedules.lock().unwrap().get(&id).cloned()
    }

    pub(crate) fn shared_schedules(&self) -> Arc<Mutex<HashMap<i64, Schedule>>> {
        Arc::clone(&self.schedules)
    }
}

#[async_trait]
impl ScheduleRepository for MockScheduleRepository {
    async fn get_due(&self, now: DateTime<Utc>) -> EtlResult<Vec<Schedule>> {
        let mut due: Vec<Schedule> = self
            .schedules
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run);
        Ok(due)
    }

    async fn get_by_id(&self, id: i64) -> EtlResult<Option<Schedule>> {
        Ok(self.schedules.lock().unwrap().get(&id).cloned())
    }

    async fn update_next_run(&self, id: i64, next_run: DateTime<Utc>) -> EtlResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules
            .get_mut(&id)
            .ok_or_else(|| EtlError::schedule_not_found(id))?;
        schedule.next_run = Some(next_run);
        schedule.updated_at = Utc::now();
        Ok(())
    }

    async fn increment_failure_count(&self, id: i64) -> EtlResult<()> {
        if let Some(schedule) = self.schedules.lock().unwrap().get_mut(&id) {
            schedule.failure_count += 1;
        }
        Ok(())
    }

    async fn count_active(&self) -> EtlResult<i64> {
        Ok(self
            .schedules
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_active)
            .count() as i64)
    }
}

// ============================================================================
// 任务控制
// ============================================================================

#[derive(Clone, Default)]
pub struct MockJobControlRepository {
    controls: Arc<Mutex<HashMap<String, JobControl>>>,
}

impl MockJobControlRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shared_controls(&self) -> Arc<Mutex<HashMap<String, JobControl>>> {
        Arc::clone(&self.controls)
    }
}

#[async_trait]
impl JobControlRepository for MockJobControlRepository {
    async fn pause(&self, job_name: &str, paused_by: &str, reason: &str) -> EtlResult<()> {
        let now = Utc::now();
        let mut controls = self.controls.lock().unwrap();
        let entry = controls
            .entry(job_name.to_string())
            .or_insert_with(|| JobControl {
                job_name: job_name.to_string(),
                is_paused: false,
                paused_at: None,
                paused_by: None,
                pause_reason: None,
                created_at: now,
                updated_at: now,
            });
        entry.is_paused = true;
        entry.paused_at = Some(now);
        entry.paused_by = Some(paused_by.to_string());
        entry.pause_reason = Some(reason.to_string());
        entry.updated_at = now;
        Ok(())
    }

    async fn resume(&self, job_name: &str) -> EtlResult<()> {
        if let Some(entry) = self.controls.lock().unwrap().get_mut(job_name) {
            entry.is_paused = false;
            entry.paused_at = None;
            entry.paused_by = None;
            entry.pause_reason = None;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn is_paused(&self, job_name: &str) -> EtlResult<bool> {
        Ok(self
            .controls
            .lock()
            .unwrap()
            .get(job_name)
            .map(|c| c.is_paused)
            .unwrap_or(false))
    }

    async fn get(&self, job_name: &str) -> EtlResult<Option<JobControl>> {
        Ok(self.controls.lock().unwrap().get(job_name).cloned())
    }

    async fn list(&self) -> EtlResult<Vec<JobControl>> {
        let mut all: Vec<JobControl> = self.controls.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        Ok(all)
    }
}

// ============================================================================
// 任务运行
// ============================================================================

#[derive(Clone)]
pub struct MockJobRunRepository {
    runs: Arc<Mutex<HashMap<i64, JobRun>>>,
    next_id: Arc<Mutex<i64>>,
    jobs: Arc<Mutex<HashMap<i64, JobDefinition>>>,
    schedules: Arc<Mutex<HashMap<i64, Schedule>>>,
    controls: Arc<Mutex<HashMap<String, JobControl>>>,
    claim_failures: Arc<AtomicU32>,
}

impl MockJobRunRepository {
    /// 构造时共享任务定义 / 调度计划 / 任务控制的底层映射，
    /// 认领与物化的行为因此和真实存储里的连接查询一致。
    pub fn new(
        jobs: &MockJobRepository,
        schedules: &MockScheduleRepository,
        controls: &MockJobControlRepository,
    ) -> Self {
        Self {
            runs: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
            jobs: jobs.shared_jobs(),
            schedules: schedules.shared_schedules(),
            controls: controls.shared_controls(),
            claim_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn insert(&self, mut run: JobRun) -> i64 {
        let mut next_id = self.next_id.lock().unwrap();
        if run.id == 0 {
            run.id = *next_id;
        }
        *next_id = (*next_id).max(run.id) + 1;
        let id = run.id;
        self.runs.lock().unwrap().insert(id, run);
        id
    }

    pub fn get(&self, id: i64) -> Option<JobRun> {
        self.runs.lock().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<JobRun> {
        self.runs.lock().unwrap().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    /// 注入 N 次认领失败，用于驱动 Worker 的连续错误退避路径
    pub fn inject_claim_failures(&self, count: u32) {
        self.claim_failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobRunRepository for MockJobRunRepository {
    async fn create_scheduled(
        &self,
        schedule: &Schedule,
        job: &JobDefinition,
        scheduled_for: DateTime<Utc>,
        runtime_parameters: serde_json::Value,
    ) -> EtlResult<JobRun> {
        let run_name = format!("{} - {}", job.name, scheduled_for.format("%Y-%m-%d %H:%M"));
        let mut run = JobRun::new(
            job.id,
            Some(schedule.id),
            run_name,
            TriggerType::Scheduled,
            scheduled_for,
            runtime_parameters,
        );
        run.max_retries = DEFAULT_MAX_RETRIES;
        let id = self.insert(run);

        if let Some(schedule) = self.schedules.lock().unwrap().get_mut(&schedule.id) {
            schedule.run_count += 1;
            schedule.last_run = Some(scheduled_for);
        }

        Ok(self.get(id).expect("inserted run"))
    }

    async fn claim_next_queued(&self, worker_id: &str) -> EtlResult<Option<JobRun>> {
        if self.claim_failures.load(Ordering::SeqCst) > 0 {
            self.claim_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(EtlError::database_error("injected claim failure"));
        }

        let jobs = self.jobs.lock().unwrap();
        let controls = self.controls.lock().unwrap();
        let mut runs = self.runs.lock().unwrap();

        let mut queued: Vec<&JobRun> = runs
            .values()
            .filter(|r| r.status == RunStatus::Queued)
            .filter(|r| {
                jobs.get(&r.job_id).map(|job| {
                    job.is_active
                        && !controls.get(&job.name).map(|c| c.is_paused).unwrap_or(false)
                }) == Some(true)
            })
            .collect();
        queued.sort_by_key(|r| (r.created_at, r.id));

        let Some(id) = queued.first().map(|r| r.id) else {
            return Ok(None);
        };

        let run = runs.get_mut(&id).expect("claimed run");
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        run.worker_id = Some(worker_id.to_string());
        Ok(Some(run.clone()))
    }

    async fn get_by_id(&self, id: i64) -> EtlResult<Option<JobRun>> {
        Ok(self.runs.lock().unwrap().get(&id).cloned())
    }

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
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| EtlError::run_not_found(run_id))?;

        run.status = status;
        run.records_processed = processed;
        run.records_failed = failed;
        run.records_skipped = skipped;
        run.error_message = error_message.map(|s| s.to_string());
        run.error_category = error_category;
        if status.is_terminal() && run.completed_at.is_none() {
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_progress(&self, run_id: i64, processed: i32, failed: i32) -> EtlResult<()> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.get_mut(&run_id) {
            if run.status == RunStatus::Running {
                run.records_processed = processed;
                run.records_failed = failed;
            }
        }
        Ok(())
    }

    async fn requeue_for_retry(&self, run_id: i64, error_message: &str) -> EtlResult<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| EtlError::run_not_found(run_id))?;

        run.status = RunStatus::Queued;
        run.retry_count += 1;
        run.error_message = Some(error_message.to_string());
        run.worker_id = None;
        run.started_at = None;
        Ok(())
    }

    async fn get_retry_count(&self, run_id: i64) -> EtlResult<i32> {
        self.runs
            .lock()
            .unwrap()
            .get(&run_id)
            .map(|r| r.retry_count)
            .ok_or_else(|| EtlError::run_not_found(run_id))
    }
}

// ============================================================================
// 度量存储
// ============================================================================

#[derive(Clone, Default)]
pub struct MockMeasurementRepository {
    points: Arc<Mutex<Vec<NumericValue>>>,
    seen: Arc<Mutex<std::collections::HashSet<(i64, DateTime<Utc>)>>>,
    fail_inserts: Arc<AtomicBool>,
}

impl MockMeasurementRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> Vec<NumericValue> {
        self.points.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.points.lock().unwrap().len()
    }

    /// 让后续写入全部失败，驱动按页失败计数路径
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MeasurementRepository for MockMeasurementRepository {
    async fn insert_points(&self, values: &[NumericValue]) -> EtlResult<u64> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(EtlError::database_error("injected insert failure"));
        }

        let mut seen = self.seen.lock().unwrap();
        let mut points = self.points.lock().unwrap();
        let mut inserted = 0u64;
        for v in values {
            // 与 (series_id, time_point, version) 唯一约束等价，version 恒为默认值
            if seen.insert((v.series_id, v.timestamp)) {
                points.push(*v);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

// ============================================================================
// 运行日志
// ============================================================================

#[derive(Clone, Default)]
pub struct MemoryRunLogger {
    records: Arc<Mutex<Vec<RunLogRecord>>>,
}

impl MemoryRunLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RunLogRecord> {
        self.records.lock().unwrap().clone()
    }

    /// 某个运行实例的消息列表（按写入顺序）
    pub fn messages_for(&self, run_id: i64) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.run_id == run_id)
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn count_message(&self, run_id: i64, message: &str) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.run_id == run_id && r.message.starts_with(message))
            .count()
    }
}

#[async_trait]
impl RunLogger for MemoryRunLogger {
    async fn append(
        &self,
        run_id: i64,
        level: LogLevel,
        message: &str,
        context: serde_json::Value,
        component: &str,
    ) {
        let mut records = self.records.lock().unwrap();
        let id = records.len() as i64 + 1;
        records.push(RunLogRecord {
            id,
            run_id,
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            context,
            component: component.to_string(),
        });
    }
}
