use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;

use etl_domain::entities::RunStatus;
use etl_testing_utils::{
    JobDefinitionBuilder, MockJobControlRepository, MockJobRepository, MockJobRunRepository,
    MockScheduleRepository, ScheduleBuilder,
};

use crate::scheduler::JobScheduler;

struct Fixture {
    jobs: MockJobRepository,
    schedules: MockScheduleRepository,
    runs: MockJobRunRepository,
    scheduler: JobScheduler,
}

fn fixture() -> Fixture {
    let jobs = MockJobRepository::new();
    let schedules = MockScheduleRepository::new();
    let controls = MockJobControlRepository::new();
    let runs = MockJobRunRepository::new(&jobs, &schedules, &controls);
    let scheduler = JobScheduler::new(
        Arc::new(schedules.clone()),
        Arc::new(jobs.clone()),
        Arc::new(runs.clone()),
    );
    Fixture {
        jobs,
        schedules,
        runs,
        scheduler,
    }
}

#[tokio::test]
async fn test_due_schedule_materializes_one_queued_run() {
    let f = fixture();
    f.jobs.insert(
        JobDefinitionBuilder::new(1, "sync-levels", "realtime_sync")
            .parameters(json!({"series_ids": [1, 2]}))
            .build(),
    );
    f.schedules.insert(
        ScheduleBuilder::new(10, 1, "*/15 * * * *")
            .name("every-15m")
            .next_run(Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap())
            .build(),
    );
    f.jobs.bind_schedule(10, 1);

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 7).unwrap();
    let stats = f.scheduler.run_scheduling_cycle(now).await.unwrap();

    assert_eq!(stats.runs_created, 1);
    assert_eq!(stats.schedules_processed, 1);
    assert_eq!(stats.errors, 0);

    let all = f.runs.all();
    assert_eq!(all.len(), 1);
    let run = &all[0];
    assert_eq!(run.status, RunStatus::Queued);
    assert_eq!(run.schedule_id, Some(10));
    assert_eq!(
        run.scheduled_for,
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap()
    );
    assert_eq!(run.name, "sync-levels - 2025-01-01 00:15");

    // next_run 推进到下一个未来边界，计数更新
    let schedule = f.schedules.get(10).unwrap();
    assert_eq!(
        schedule.next_run,
        Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 30, 0).unwrap())
    );
    assert_eq!(schedule.run_count, 1);
    assert_eq!(
        schedule.last_run,
        Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap())
    );
}

#[tokio::test]
async fn test_nothing_due_creates_nothing() {
    let f = fixture();
    f.jobs.insert(JobDefinitionBuilder::new(1, "sync", "realtime_sync").build());
    f.schedules.insert(
        ScheduleBuilder::new(10, 1, "*/15 * * * *")
            .next_run(Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap())
            .build(),
    );
    f.jobs.bind_schedule(10, 1);

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 7).unwrap();
    let stats = f.scheduler.run_scheduling_cycle(now).await.unwrap();

    assert_eq!(stats.runs_created, 0);
    assert_eq!(f.runs.count(), 0);
    // next_run 保持不变
    assert_eq!(
        f.schedules.get(10).unwrap().next_run,
        Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap())
    );
}

#[tokio::test]
async fn test_inactive_job_is_skipped_without_advancing_next_run() {
    let f = fixture();
    f.jobs.insert(
        JobDefinitionBuilder::new(1, "retired", "realtime_sync")
            .inactive()
            .build(),
    );
    let next_run = Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap();
    f.schedules.insert(
        ScheduleBuilder::new(10, 1, "*/15 * * * *").next_run(next_run).build(),
    );
    f.jobs.bind_schedule(10, 1);

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 16, 0).unwrap();
    let stats = f.scheduler.run_scheduling_cycle(now).await.unwrap();

    assert_eq!(stats.runs_created, 0);
    assert_eq!(stats.errors, 0);
    assert_eq!(f.runs.count(), 0);
    assert_eq!(f.schedules.get(10).unwrap().next_run, Some(next_run));
}

#[tokio::test]
async fn test_invalid_cron_skips_and_keeps_next_run_visible() {
    let f = fixture();
    f.jobs.insert(JobDefinitionBuilder::new(1, "broken", "realtime_sync").build());
    let next_run = Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap();
    f.schedules.insert(
        ScheduleBuilder::new(10, 1, "not a cron").next_run(next_run).build(),
    );
    f.jobs.bind_schedule(10, 1);

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 16, 0).unwrap();
    let stats = f.scheduler.run_scheduling_cycle(now).await.unwrap();

    assert_eq!(stats.errors, 1);
    assert_eq!(stats.runs_created, 0);
    assert_eq!(f.runs.count(), 0);

    let schedule = f.schedules.get(10).unwrap();
    // 问题保持可见：next_run 不被静默推进
    assert_eq!(schedule.next_run, Some(next_run));
    assert_eq!(schedule.failure_count, 1);
}

#[tokio::test]
async fn test_one_schedule_error_does_not_block_others() {
    let f = fixture();
    f.jobs.insert(JobDefinitionBuilder::new(1, "broken", "realtime_sync").build());
    f.jobs.insert(JobDefinitionBuilder::new(2, "healthy", "realtime_sync").build());

    let early = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap();
    f.schedules.insert(ScheduleBuilder::new(10, 1, "bogus").next_run(early).build());
    f.schedules.insert(
        ScheduleBuilder::new(11, 2, "*/15 * * * *").next_run(later).build(),
    );
    f.jobs.bind_schedule(10, 1);
    f.jobs.bind_schedule(11, 2);

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 16, 0).unwrap();
    let stats = f.scheduler.run_scheduling_cycle(now).await.unwrap();

    assert_eq!(stats.errors, 1);
    assert_eq!(stats.runs_created, 1);
    let all = f.runs.all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].job_id, 2);
}

#[tokio::test]
async fn test_overdue_schedule_creates_single_run_and_converges() {
    let f = fixture();
    f.jobs.insert(JobDefinitionBuilder::new(1, "sync", "realtime_sync").build());
    // 已经错过了 3 小时（12 个间隔）
    f.schedules.insert(
        ScheduleBuilder::new(10, 1, "*/15 * * * *")
            .next_run(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
            .build(),
    );
    f.jobs.bind_schedule(10, 1);

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 3, 7, 0).unwrap();
    let stats = f.scheduler.run_scheduling_cycle(now).await.unwrap();

    // 不补跑：只物化一个实例，next_run 收敛到未来边界
    assert_eq!(stats.runs_created, 1);
    assert_eq!(f.runs.count(), 1);
    assert_eq!(
        f.schedules.get(10).unwrap().next_run,
        Some(Utc.with_ymd_and_hms(2025, 1, 1, 3, 15, 0).unwrap())
    );
}

#[tokio::test]
async fn test_runtime_parameters_resolve_placeholders() {
    let f = fixture();
    f.jobs.insert(
        JobDefinitionBuilder::new(1, "daily-export", "historical_load")
            .parameters(json!({
                "day": "DYNAMIC_DAY_START",
                "prev": "DYNAMIC_YESTERDAY",
                "series_ids": [9],
            }))
            .build(),
    );
    f.schedules.insert(
        ScheduleBuilder::new(10, 1, "0 6 * * *")
            .next_run(Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap())
            .build(),
    );
    f.jobs.bind_schedule(10, 1);

    let now = Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 30).unwrap();
    f.scheduler.run_scheduling_cycle(now).await.unwrap();

    let run = &f.runs.all()[0];
    assert_eq!(run.runtime_parameters["day"], "2025-03-10");
    assert_eq!(run.runtime_parameters["prev"], "2025-03-09");
    assert_eq!(run.runtime_parameters["series_ids"], json!([9]));
}

#[tokio::test]
async fn test_next_run_strictly_greater_after_materialisation() {
    let f = fixture();
    f.jobs.insert(JobDefinitionBuilder::new(1, "sync", "realtime_sync").build());
    let scheduled_for = Utc.with_ymd_and_hms(2025, 1, 1, 2, 0, 0).unwrap();
    f.schedules.insert(
        ScheduleBuilder::new(10, 1, "0 * * * *").next_run(scheduled_for).build(),
    );
    f.jobs.bind_schedule(10, 1);

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 2, 0, 10).unwrap();
    f.scheduler.run_scheduling_cycle(now).await.unwrap();

    let schedule = f.schedules.get(10).unwrap();
    assert!(schedule.next_run.unwrap() > scheduled_for);
}
