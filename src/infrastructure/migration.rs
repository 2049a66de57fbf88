//! 数据库迁移管理模块
//! 提供迁移版本管理与执行日志，内嵌账务核心 schema
//!
//! CockroachDB 兼容：
//! - 使用 BIGINT / TIMESTAMPTZ / CURRENT_TIMESTAMP，更标准化
//! - 无触发器，updated_at 由应用层写入

use anyhow::{Context, Result};
use sqlx::Row;

use super::db::PgPool;

/// 迁移信息
#[derive(Debug, Clone)]
pub struct MigrationInfo {
    pub version: i64,
    pub name: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
}

/// 内嵌迁移：版本号、名称、语句列表
///
/// 每条语句单独执行，sqlx 的预处理协议不接受多语句文本。
const MIGRATIONS: &[(i64, &str, &[&str])] = &[(
    1,
    "accounting_core",
    &[
        r#"
        CREATE TABLE IF NOT EXISTS asset_network (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name TEXT NOT NULL UNIQUE,
            human_friendly_name TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS crypto_network_status (
            network_id UUID PRIMARY KEY REFERENCES asset_network(id),
            latest_block BIGINT,
            heartbeat_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS asset (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            network_id UUID NOT NULL REFERENCES asset_network(id),
            name TEXT NOT NULL,
            symbol TEXT,
            description TEXT,
            external_id BYTEA,
            supply NUMERIC(40, 20) NOT NULL DEFAULT 0,
            asset_class TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'public',
            archived_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMPTZ,
            UNIQUE (network_id, symbol),
            UNIQUE (network_id, name),
            UNIQUE (network_id, external_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS account (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            asset_id UUID NOT NULL REFERENCES asset(id),
            denormalized_balance NUMERIC(40, 20) NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS account_transaction (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            account_id UUID NOT NULL REFERENCES account(id),
            amount NUMERIC(40, 20) NOT NULL,
            message TEXT,
            counterparty_id UUID REFERENCES account_transaction(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_account_transaction_account
            ON account_transaction (account_id)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS crypto_address (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            network_id UUID NOT NULL REFERENCES asset_network(id),
            address BYTEA,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (network_id, address)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS crypto_address_account (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            address_id UUID NOT NULL REFERENCES crypto_address(id),
            account_id UUID NOT NULL REFERENCES account(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS crypto_operation (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            network_id UUID NOT NULL REFERENCES asset_network(id),
            kind TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'waiting',
            address_id UUID REFERENCES crypto_address(id),
            crypto_account_id UUID REFERENCES crypto_address_account(id),
            holding_account_id UUID REFERENCES account(id),
            external_address BYTEA,
            txid BYTEA,
            opid BYTEA UNIQUE,
            block BIGINT,
            required_confirmation_count INT,
            attempts INT NOT NULL DEFAULT 0,
            attempted_at TIMESTAMPTZ,
            performed_at TIMESTAMPTZ,
            broadcasted_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            failed_at TIMESTAMPTZ,
            confirmation_deadline_at TIMESTAMPTZ,
            error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_crypto_operation_queue
            ON crypto_operation (network_id, state)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_crypto_operation_tracking
            ON crypto_operation (network_id, completed_at)
        "#,
    ],
)];

/// 初始化迁移表
pub async fn init_migration_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create migration table")?;

    Ok(())
}

/// 获取已应用的迁移版本列表
pub async fn get_applied_migrations(pool: &PgPool) -> Result<Vec<MigrationInfo>> {
    init_migration_table(pool).await?;

    let rows =
        sqlx::query("SELECT version, name, applied_at FROM schema_migrations ORDER BY version")
            .fetch_all(pool)
            .await
            .context("Failed to query applied migrations")?;

    let migrations = rows
        .into_iter()
        .map(|row| MigrationInfo {
            version: row.get(0),
            name: row.get(1),
            applied_at: row.get(2),
        })
        .collect();

    Ok(migrations)
}

/// 应用所有未执行的迁移
///
/// 幂等：记录使用 ON CONFLICT (version) DO NOTHING，语句均为 IF NOT EXISTS。
pub async fn apply_migrations(pool: &PgPool) -> Result<usize> {
    init_migration_table(pool).await?;

    let applied: Vec<i64> = get_applied_migrations(pool)
        .await?
        .into_iter()
        .map(|m| m.version)
        .collect();

    let mut count = 0usize;
    for (version, name, statements) in MIGRATIONS {
        if applied.contains(version) {
            continue;
        }

        tracing::info!(version = *version, name = *name, "Applying migration");
        for statement in *statements {
            sqlx::query(statement)
                .execute(pool)
                .await
                .with_context(|| format!("Migration {} failed", version))?;
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, name) VALUES ($1, $2) \
             ON CONFLICT (version) DO NOTHING",
        )
        .bind(*version)
        .bind(*name)
        .execute(pool)
        .await
        .context("Failed to record migration")?;

        count += 1;
    }

    Ok(count)
}
