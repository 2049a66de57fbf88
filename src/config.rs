//! 配置管理模块
//! 支持从环境变量和 TOML 配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 操作管道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 未显式指定时操作的默认确认数要求
    pub default_confirmation_count: i32,
    /// 人工审批的默认超时（秒），超时后操作被取消并回退资金
    pub approval_timeout_secs: u64,
    /// 执行器单批认领的最大操作数
    pub claim_batch_size: i64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_confirmation_count: 12,
            approval_timeout_secs: 4 * 3600,
            claim_batch_size: 50,
        }
    }
}

impl Config {
    /// 从环境变量加载配置（.env 文件优先生效）
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            max_connections: env_parse("DB_MAX_CONNS", 16)?,
            min_connections: env_parse("DB_MIN_CONNS", 2)?,
            acquire_timeout_secs: env_parse("DB_ACQ_TIMEOUT_SECS", 5)?,
            idle_timeout_secs: env_parse("DB_IDLE_TIMEOUT_SECS", 300)?,
        };

        let logging = LoggingConfig {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        };

        let pipeline = PipelineConfig {
            default_confirmation_count: env_parse("PIPELINE_DEFAULT_CONFIRMATIONS", 12)?,
            approval_timeout_secs: env_parse("PIPELINE_APPROVAL_TIMEOUT_SECS", 4 * 3600)?,
            claim_batch_size: env_parse("PIPELINE_CLAIM_BATCH_SIZE", 50)?,
        };

        Ok(Self {
            database,
            logging,
            pipeline,
        })
    }

    /// 从 TOML 文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_defaults() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.default_confirmation_count, 12);
        assert_eq!(pipeline.claim_batch_size, 50);
    }

    #[test]
    fn parses_toml() {
        let config: Config = toml::from_str(
            r#"
            [database]
            url = "postgres://root@localhost:26257/vaultcore?sslmode=disable"
            max_connections = 8
            min_connections = 1
            acquire_timeout_secs = 5
            idle_timeout_secs = 300

            [logging]
            level = "debug"
            format = "json"

            [pipeline]
            default_confirmation_count = 3
            approval_timeout_secs = 600
            claim_batch_size = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.pipeline.default_confirmation_count, 3);
    }
}
