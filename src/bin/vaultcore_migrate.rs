//! 迁移工具：建库 schema 并打印已应用版本

use anyhow::Result;
use vaultcore::{
    config::Config,
    infrastructure::{db, logging, migration},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init_logging(&config.logging).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let pool = db::init_pool(&config.database).await?;
    let applied = migration::apply_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    for info in migration::get_applied_migrations(&pool).await? {
        tracing::info!(version = info.version, name = %info.name, applied_at = %info.applied_at, "migration");
    }

    Ok(())
}
