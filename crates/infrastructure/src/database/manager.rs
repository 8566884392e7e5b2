//! 数据库连接管理
//!
//! 启动阶段用指数退避重试建立连接池：1 秒起步，翻倍，30 秒封顶，
//! 默认 10 次后放弃并让进程以非零退出码终止。

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use etl_config::DatabaseConfig;
use etl_errors::{EtlError, EtlResult};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 带重试地创建数据库连接池
///
/// `pool_size` 按进程角色传入：调度器用小池，Worker 稍大。
pub async fn connect_with_retry(
    config: &DatabaseConfig,
    pool_size: u32,
    max_retries: u32,
) -> EtlResult<PgPool> {
    let mut backoff = INITIAL_BACKOFF;
    let mut last_error: Option<sqlx::Error> = None;

    for attempt in 0..=max_retries {
        info!(
            "尝试连接数据库 ({}/{}): {}",
            attempt + 1,
            max_retries + 1,
            mask_database_url(&config.url)
        );

        let result = PgPoolOptions::new()
            .max_connections(pool_size)
            .min_connections(config.min_connections.min(pool_size))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.max_lifetime_seconds))
            .connect(&config.url)
            .await;

        match result {
            Ok(pool) => {
                // 池是惰性的，ping 一次确认连接真正可用
                match sqlx::query("SELECT 1").execute(&pool).await {
                    Ok(_) => {
                        info!("数据库连接成功");
                        return Ok(pool);
                    }
                    Err(e) => {
                        warn!("数据库探活失败: {}", e);
                        pool.close().await;
                        last_error = Some(e);
                    }
                }
            }
            Err(e) => {
                warn!("数据库连接失败: {}", e);
                last_error = Some(e);
            }
        }

        if attempt < max_retries {
            warn!("{} 秒后重试数据库连接", backoff.as_secs());
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    Err(EtlError::DatabaseOperation(format!(
        "连接数据库失败，已重试 {} 次: {}",
        max_retries + 1,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// 数据库健康检查
pub async fn health_check(pool: &PgPool) -> EtlResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// 屏蔽数据库URL中的敏感信息
pub fn mask_database_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_database_url() {
        assert_eq!(
            mask_database_url("postgresql://etl:secret@db:5432/etl"),
            "postgresql://etl:***@db:5432/etl"
        );
        assert_eq!(
            mask_database_url("postgresql://localhost/etl"),
            "postgresql://localhost/etl"
        );
    }
}
