use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("任务定义未找到: {id}")]
    JobNotFound { id: i64 },
    #[error("调度计划未找到: {id}")]
    ScheduleNotFound { id: i64 },
    #[error("任务运行实例未找到: {id}")]
    RunNotFound { id: i64 },
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("无效的任务参数: {0}")]
    InvalidJobParams(String),
    #[error("不支持的任务类型: unknown job type: {0}")]
    UnknownJobType(String),
    #[error("任务执行错误: {0}")]
    JobExecution(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("网络错误: {0}")]
    Network(String),
    #[error("任务已取消: operation canceled")]
    Cancelled,
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type EtlResult<T> = Result<T, EtlError>;

impl EtlError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn job_not_found(id: i64) -> Self {
        Self::JobNotFound { id }
    }
    pub fn schedule_not_found(id: i64) -> Self {
        Self::ScheduleNotFound { id }
    }
    pub fn run_not_found(id: i64) -> Self {
        Self::RunNotFound { id }
    }
    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        Self::InvalidJobParams(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn execution_error<S: Into<String>>(msg: S) -> Self {
        Self::JobExecution(msg.into())
    }

    /// 判断错误是否可能随时间自行恢复（数据库闪断、网络抖动等）。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EtlError::Database(_)
                | EtlError::DatabaseOperation(_)
                | EtlError::Network(_)
                | EtlError::Cancelled
        )
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        EtlError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for EtlError {
    fn from(err: anyhow::Error) -> Self {
        EtlError::Internal(err.to_string())
    }
}

/// 将错误及其整个 source 链展开为一条消息。
///
/// reqwest 等库的 `Display` 往往只打印最外层（"error sending request"），
/// 真正的失败原因（"connection refused"）藏在 source 链里；错误分类依赖
/// 这些子串，所以在转成 `EtlError` 之前先把链条拍平。
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Leaf;
    impl std::fmt::Display for Leaf {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "connection refused")
        }
    }
    impl std::error::Error for Leaf {}

    #[derive(Debug)]
    struct Outer(Leaf);
    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "error sending request")
        }
    }
    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_error_chain_flattens_sources() {
        let err = Outer(Leaf);
        let message = error_chain(&err);
        assert_eq!(message, "error sending request: connection refused");
    }

    #[test]
    fn test_unknown_job_type_message() {
        let err = EtlError::UnknownJobType("bulk_export".to_string());
        assert!(err.to_string().contains("unknown job type: bulk_export"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EtlError::Network("timeout".to_string()).is_retryable());
        assert!(EtlError::Cancelled.is_retryable());
        assert!(!EtlError::InvalidJobParams("bad".to_string()).is_retryable());
    }
}
