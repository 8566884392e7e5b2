//! 测试数据构造器

use chrono::{DateTime, Utc};
use serde_json::Value;

use etl_domain::entities::{JobDefinition, JobRun, RunStatus, Schedule, TriggerType};
use etl_domain::DEFAULT_MAX_RETRIES;

pub struct JobDefinitionBuilder {
    job: JobDefinition,
}

impl JobDefinitionBuilder {
    pub fn new(id: i64, name: &str, job_type: &str) -> Self {
        let now = Utc::now();
        Self {
            job: JobDefinition {
                id,
                name: name.to_string(),
                job_type: job_type.to_string(),
                description: String::new(),
                parameters: serde_json::json!({}),
                is_active: true,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn parameters(mut self, parameters: Value) -> Self {
        self.job.parameters = parameters;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.job.is_active = false;
        self
    }

    pub fn build(self) -> JobDefinition {
        self.job
    }
}

pub struct ScheduleBuilder {
    schedule: Schedule,
}

impl ScheduleBuilder {
    pub fn new(id: i64, job_id: i64, cron_expression: &str) -> Self {
        let now = Utc::now();
        Self {
            schedule: Schedule {
                id,
                job_id,
                name: format!("schedule-{id}"),
                cron_expression: cron_expression.to_string(),
                timezone: String::new(),
                is_active: true,
                next_run: None,
                last_run: None,
                run_count: 0,
                failure_count: 0,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.schedule.name = name.to_string();
        self
    }

    pub fn next_run(mut self, next_run: DateTime<Utc>) -> Self {
        self.schedule.next_run = Some(next_run);
        self
    }

    pub fn timezone(mut self, timezone: &str) -> Self {
        self.schedule.timezone = timezone.to_string();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.schedule.is_active = false;
        self
    }

    pub fn build(self) -> Schedule {
        self.schedule
    }
}

pub struct JobRunBuilder {
    run: JobRun,
}

impl JobRunBuilder {
    pub fn new(job_id: i64, name: &str) -> Self {
        Self {
            run: JobRun {
                id: 0,
                job_id,
                schedule_id: None,
                name: name.to_string(),
                status: RunStatus::Queued,
                trigger_type: TriggerType::Manual,
                scheduled_for: Utc::now(),
                started_at: None,
                completed_at: None,
                duration_seconds: None,
                runtime_parameters: serde_json::json!({}),
                records_processed: 0,
                records_failed: 0,
                records_skipped: 0,
                error_message: None,
                error_category: None,
                retry_count: 0,
                max_retries: DEFAULT_MAX_RETRIES,
                worker_id: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn id(mut self, id: i64) -> Self {
        self.run.id = id;
        self
    }

    pub fn schedule_id(mut self, schedule_id: i64) -> Self {
        self.run.schedule_id = Some(schedule_id);
        self.run.trigger_type = TriggerType::Scheduled;
        self
    }

    pub fn scheduled_for(mut self, scheduled_for: DateTime<Utc>) -> Self {
        self.run.scheduled_for = scheduled_for;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.run.created_at = created_at;
        self
    }

    pub fn parameters(mut self, parameters: Value) -> Self {
        self.run.runtime_parameters = parameters;
        self
    }

    pub fn max_retries(mut self, max_retries: i32) -> Self {
        self.run.max_retries = max_retries;
        self
    }

    pub fn build(self) -> JobRun {
        self.run
    }
}
