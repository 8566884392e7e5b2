//! 执行器注册表
//!
//! 按 `job_type` 做标签分发：新的执行器种类只需要注册，Worker 循环
//! 本身不变。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use etl_domain::entities::{ExecutionStats, JobDefinition, JobRun};
use etl_errors::EtlResult;

/// 任务执行器接口
///
/// 执行器在批次边界检查取消信号，并把取消作为瞬时错误返回，
/// 让运行实例回到排队状态等待重启后继续。进度通过仓储的
/// `update_progress` 写回；终态由 Worker 统一写入。
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// 执行器处理的任务类型标签
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        token: &CancellationToken,
        run: &JobRun,
        job: &JobDefinition,
    ) -> EtlResult<ExecutionStats>;
}

/// 执行器注册表
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn JobExecutor>) {
        let name = executor.name().to_string();
        info!("注册任务执行器: {}", name);
        self.executors.insert(name, executor);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobExecutor>> {
        self.executors.get(job_type).cloned()
    }

    pub fn supported_types(&self) -> Vec<String> {
        self.executors.keys().cloned().collect()
    }
}
