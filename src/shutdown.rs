//! 优雅关闭
//!
//! SIGINT / SIGTERM 翻转进程级取消令牌；驱动循环在一个 tick 内观察
//! 到信号，执行中的处理器在下一个检查点尽快返回。

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 安装信号处理器，返回进程级取消令牌
///
/// 必须在 tokio 运行时内调用。
pub fn install_signal_handler() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let signal_token = token.clone();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).context("注册 SIGTERM 处理器失败")?;
        let mut sigint = signal(SignalKind::interrupt()).context("注册 SIGINT 处理器失败")?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("收到 SIGTERM，开始关闭"),
                _ = sigint.recv() => info!("收到 SIGINT，开始关闭"),
            }
            signal_token.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("收到 Ctrl-C，开始关闭");
            }
            signal_token.cancel();
        });
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_token_starts_uncancelled() {
        let token = install_signal_handler().unwrap();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_manual_cancel_propagates_to_clones() {
        let token = install_signal_handler().unwrap();
        let clone = token.clone();

        token.cancel();

        let result = timeout(Duration::from_millis(100), clone.cancelled()).await;
        assert!(result.is_ok());
    }
}
