use chrono::{TimeZone, Utc};

use crate::cron_utils::CronScheduler;

#[test]
fn test_accepts_standard_five_field_expressions() {
    for expr in [
        "*/15 * * * *",
        "0 2 * * *",
        "30 6 1 * *",
        "0 0 * * 0",
        "*/5 8-18 * * 1-5",
    ] {
        assert!(CronScheduler::new(expr).is_ok(), "should accept '{expr}'");
    }
}

#[test]
fn test_rejects_wrong_field_counts_and_garbage() {
    for expr in [
        "",
        "* * * *",
        "0 */15 * * * *",
        "0 0 0 * * * *",
        "every 15 minutes",
        "61 * * * *",
    ] {
        assert!(CronScheduler::new(expr).is_err(), "should reject '{expr}'");
    }
}

#[test]
fn test_next_execution_time_is_strictly_greater() {
    let cron = CronScheduler::new("*/15 * * * *").unwrap();

    let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 7).unwrap();
    let next = cron.next_execution_time(from).unwrap();
    assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap());

    // 恰好落在边界上时也必须严格向后
    let on_boundary = Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap();
    let next = cron.next_execution_time(on_boundary).unwrap();
    assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 0, 30, 0).unwrap());
}

#[test]
fn test_next_of_next_advances() {
    let instants = [
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 7).unwrap(),
        Utc.with_ymd_and_hms(2025, 6, 30, 23, 59, 59).unwrap(),
        Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap(),
    ];
    for expr in ["*/15 * * * *", "0 2 * * *", "0 0 1 * *", "30 4 * * 1"] {
        let cron = CronScheduler::new(expr).unwrap();
        for t in instants {
            let first = cron.next_execution_time(t).unwrap();
            let second = cron.next_execution_time(first).unwrap();
            assert!(first > t, "next({expr}, {t}) must be after the instant");
            assert!(second > first, "next must keep advancing for {expr}");
        }
    }
}

#[test]
fn test_is_due_with_last_run() {
    let cron = CronScheduler::new("*/15 * * * *").unwrap();
    let last_run = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

    let before_boundary = Utc.with_ymd_and_hms(2025, 1, 1, 0, 14, 59).unwrap();
    assert!(!cron.is_due(Some(last_run), before_boundary));

    let on_boundary = Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap();
    assert!(cron.is_due(Some(last_run), on_boundary));

    let after_boundary = Utc.with_ymd_and_hms(2025, 1, 1, 0, 17, 30).unwrap();
    assert!(cron.is_due(Some(last_run), after_boundary));
}

#[test]
fn test_is_due_without_last_run() {
    let cron = CronScheduler::new("*/15 * * * *").unwrap();

    // 当前分钟恰好是边界：首次执行应该触发
    let on_boundary = Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap();
    assert!(cron.is_due(None, on_boundary));

    let off_boundary = Utc.with_ymd_and_hms(2025, 1, 1, 0, 7, 0).unwrap();
    assert!(!cron.is_due(None, off_boundary));
}

#[test]
fn test_upcoming_times() {
    let cron = CronScheduler::new("0 * * * *").unwrap();
    let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 30, 0).unwrap();
    let upcoming = cron.upcoming_times(from, 3);
    assert_eq!(
        upcoming,
        vec![
            Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 1, 2, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap(),
        ]
    );
}

#[test]
fn test_validate_cron_expression() {
    assert!(CronScheduler::validate_cron_expression("*/15 * * * *").is_ok());
    assert!(CronScheduler::validate_cron_expression("not a cron").is_err());
}
