//! 动态参数解析
//!
//! 物化运行实例时，把参数模板顶层字符串值中的动态日期占位符替换为
//! 以 `scheduled_for` 为基准的具体日期。非字符串值原样透传。

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde_json::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// 解析参数模板中的动态占位符
pub fn resolve_parameters(template: &Value, scheduled_for: DateTime<Utc>) -> Value {
    match template.as_object() {
        Some(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let resolved = match value {
                        Value::String(s) => Value::String(resolve_date_tokens(s, scheduled_for)),
                        other => other.clone(),
                    };
                    (key.clone(), resolved)
                })
                .collect(),
        ),
        None => template.clone(),
    }
}

/// 替换字符串中的动态日期占位符
///
/// 周以周日为起点；月末通过下月第一天回退一天得到。
fn resolve_date_tokens(input: &str, scheduled_for: DateTime<Utc>) -> String {
    let date = scheduled_for.date_naive();
    let days_from_sunday = i64::from(date.weekday().num_days_from_sunday());

    let replacements = [
        ("DYNAMIC_WEEK_START", date - Duration::days(days_from_sunday)),
        ("DYNAMIC_WEEK_END", date + Duration::days(6 - days_from_sunday)),
        ("DYNAMIC_DAY_START", date),
        ("DYNAMIC_DAY_END", date),
        ("DYNAMIC_YESTERDAY", date - Duration::days(1)),
        ("DYNAMIC_MONTH_START", month_start(date)),
        ("DYNAMIC_MONTH_END", month_end(date)),
    ];

    let mut result = input.to_string();
    for (token, value) in replacements {
        if result.contains(token) {
            result = result.replace(token, &value.format(DATE_FORMAT).to_string());
        }
    }
    result
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn month_end(date: NaiveDate) -> NaiveDate {
    let (next_year, next_month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_day_and_yesterday_tokens() {
        let template = json!({ "day": "DYNAMIC_DAY_START", "prev": "DYNAMIC_YESTERDAY" });
        let resolved = resolve_parameters(&template, at(2025, 3, 10, 6));
        assert_eq!(resolved["day"], "2025-03-10");
        assert_eq!(resolved["prev"], "2025-03-09");
    }

    #[test]
    fn test_day_end_matches_day_start() {
        let template = json!({ "from": "DYNAMIC_DAY_START", "to": "DYNAMIC_DAY_END" });
        let resolved = resolve_parameters(&template, at(2024, 6, 1, 0));
        assert_eq!(resolved["from"], "2024-06-01");
        assert_eq!(resolved["to"], "2024-06-01");
    }

    #[test]
    fn test_week_tokens_are_sunday_anchored() {
        // 2025-03-10 是周一：所在周从 03-09（周日）到 03-15（周六）
        let template = json!({ "start": "DYNAMIC_WEEK_START", "end": "DYNAMIC_WEEK_END" });
        let resolved = resolve_parameters(&template, at(2025, 3, 10, 6));
        assert_eq!(resolved["start"], "2025-03-09");
        assert_eq!(resolved["end"], "2025-03-15");

        // 周日当天：周起点就是当天
        let resolved = resolve_parameters(&template, at(2025, 3, 9, 6));
        assert_eq!(resolved["start"], "2025-03-09");
        assert_eq!(resolved["end"], "2025-03-15");
    }

    #[test]
    fn test_month_tokens() {
        let template = json!({ "start": "DYNAMIC_MONTH_START", "end": "DYNAMIC_MONTH_END" });

        let resolved = resolve_parameters(&template, at(2024, 2, 15, 12));
        assert_eq!(resolved["start"], "2024-02-01");
        assert_eq!(resolved["end"], "2024-02-29");

        let resolved = resolve_parameters(&template, at(2025, 12, 31, 23));
        assert_eq!(resolved["start"], "2025-12-01");
        assert_eq!(resolved["end"], "2025-12-31");
    }

    #[test]
    fn test_token_inside_larger_string() {
        let template = json!({ "path": "/exports/DYNAMIC_DAY_START/data.csv" });
        let resolved = resolve_parameters(&template, at(2025, 1, 2, 0));
        assert_eq!(resolved["path"], "/exports/2025-01-02/data.csv");
    }

    #[test]
    fn test_non_string_values_pass_through() {
        let template = json!({
            "series_ids": [1, 2, 3],
            "batch_size": 1000,
            "nested": { "inner": "DYNAMIC_DAY_START" },
            "day": "DYNAMIC_DAY_START",
        });
        let resolved = resolve_parameters(&template, at(2025, 1, 2, 0));
        assert_eq!(resolved["series_ids"], json!([1, 2, 3]));
        assert_eq!(resolved["batch_size"], 1000);
        // 只替换顶层字符串值
        assert_eq!(resolved["nested"]["inner"], "DYNAMIC_DAY_START");
        assert_eq!(resolved["day"], "2025-01-02");
    }
}
