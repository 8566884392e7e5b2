//! PostgreSQL 仓储实现

mod postgres_job_control_repository;
mod postgres_job_repository;
mod postgres_job_run_repository;
mod postgres_measurement_repository;
mod postgres_schedule_repository;

pub use postgres_job_control_repository::PostgresJobControlRepository;
pub use postgres_job_repository::PostgresJobRepository;
pub use postgres_job_run_repository::PostgresJobRunRepository;
pub use postgres_measurement_repository::PostgresMeasurementRepository;
pub use postgres_schedule_repository::PostgresScheduleRepository;
