//! 错误分类
//!
//! 把执行器错误归入三个类别，驱动重试决策：
//! 只有瞬时错误会触发重新排队。匹配基于消息子串，大小写不敏感；
//! 取消信号不看消息，直接按瞬时处理。

use etl_domain::entities::ErrorCategory;
use etl_errors::EtlError;

/// 网络/连接类错误 —— 瞬时，自动重试
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection refused",
    "timeout",
    "eof",
    "broken pipe",
    "no such host",
];

/// 数据校验类错误 —— 不重试，需要人工介入
const DATA_PATTERNS: &[&str] = &["invalid", "validation", "bad request", "400", "422"];

/// 判定错误类别
pub fn categorize_error(error: &EtlError) -> ErrorCategory {
    if matches!(error, EtlError::Cancelled) {
        return ErrorCategory::Transient;
    }

    let message = error.to_string().to_lowercase();
    if contains_any(&message, TRANSIENT_PATTERNS) {
        return ErrorCategory::Transient;
    }
    if contains_any(&message, DATA_PATTERNS) {
        return ErrorCategory::Data;
    }
    ErrorCategory::System
}

fn contains_any(message: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| message.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_patterns() {
        for msg in [
            "connection refused",
            "request timeout after 30s",
            "unexpected EOF while reading",
            "write: broken pipe",
            "dial tcp: no such host",
        ] {
            assert_eq!(
                categorize_error(&EtlError::Network(msg.to_string())),
                ErrorCategory::Transient,
                "'{msg}' should be transient"
            );
        }
    }

    #[test]
    fn test_data_patterns() {
        for msg in [
            "invalid parameter: end_date",
            "validation failed for field value",
            "bad request",
        ] {
            assert_eq!(
                categorize_error(&EtlError::JobExecution(msg.to_string())),
                ErrorCategory::Data,
                "'{msg}' should be a data error"
            );
        }

        assert_eq!(
            categorize_error(&EtlError::Http {
                status: 422,
                body: "unprocessable entity".to_string()
            }),
            ErrorCategory::Data
        );
        assert_eq!(
            categorize_error(&EtlError::Http {
                status: 400,
                body: String::new()
            }),
            ErrorCategory::Data
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(
            categorize_error(&EtlError::Network("Connection Refused".to_string())),
            ErrorCategory::Transient
        );
        assert_eq!(
            categorize_error(&EtlError::JobExecution("INVALID series id".to_string())),
            ErrorCategory::Data
        );
    }

    #[test]
    fn test_transient_wins_over_data() {
        // 同时包含两类子串时按瞬时处理（先检查瞬时列表）
        assert_eq!(
            categorize_error(&EtlError::Network(
                "timeout while validating connection".to_string()
            )),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn test_cancellation_is_transient() {
        assert_eq!(categorize_error(&EtlError::Cancelled), ErrorCategory::Transient);
    }

    #[test]
    fn test_everything_else_is_system() {
        assert_eq!(
            categorize_error(&EtlError::Internal("disk full".to_string())),
            ErrorCategory::System
        );
        assert_eq!(
            categorize_error(&EtlError::UnknownJobType("bulk_export".to_string())),
            ErrorCategory::System
        );
    }
}
