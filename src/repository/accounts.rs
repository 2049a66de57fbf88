use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::infrastructure::db::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub denormalized_balance: Decimal,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccountTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub message: Option<String>,
    pub counterparty_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

const ACCOUNT_COLUMNS: &str = "id, asset_id, denormalized_balance, created_at, updated_at";
const TX_COLUMNS: &str = "id, account_id, amount, message, counterparty_id, created_at";

pub async fn create(pool: &PgPool, asset_id: Uuid) -> Result<Account, sqlx::Error> {
    let rec = sqlx::query_as::<_, Account>(&format!(
        "INSERT INTO account (asset_id) VALUES ($1) RETURNING {ACCOUNT_COLUMNS}",
    ))
    .bind(asset_id)
    .fetch_one(pool)
    .await?;
    Ok(rec)
}

pub async fn create_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    asset_id: Uuid,
) -> Result<Account, sqlx::Error> {
    let rec = sqlx::query_as::<_, Account>(&format!(
        "INSERT INTO account (asset_id) VALUES ($1) RETURNING {ACCOUNT_COLUMNS}",
    ))
    .bind(asset_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Account>, sqlx::Error> {
    let rec = sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

// Row-level lock. Concurrent transfers touching the same account serialize here.
pub async fn lock_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Account>, sqlx::Error> {
    let rec = sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = $1 FOR UPDATE",
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn insert_transaction(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    amount: Decimal,
    message: Option<&str>,
) -> Result<AccountTransaction, sqlx::Error> {
    let rec = sqlx::query_as::<_, AccountTransaction>(&format!(
        r#"
        INSERT INTO account_transaction (account_id, amount, message)
        VALUES ($1, $2, $3)
        RETURNING {TX_COLUMNS}
        "#,
    ))
    .bind(account_id)
    .bind(amount)
    .bind(message)
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec)
}

// Incremental cache maintenance, same transaction as the inserted row.
pub async fn apply_balance_delta(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    delta: Decimal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE account
        SET denormalized_balance = denormalized_balance + $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .bind(delta)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// Counterparty back-links are the only mutation a transaction row ever sees.
pub async fn link_counterparties(
    tx: &mut Transaction<'_, Postgres>,
    withdraw_id: Uuid,
    deposit_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE account_transaction SET counterparty_id = $2 WHERE id = $1")
        .bind(withdraw_id)
        .bind(deposit_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("UPDATE account_transaction SET counterparty_id = $2 WHERE id = $1")
        .bind(deposit_id)
        .bind(withdraw_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn get_transaction(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<AccountTransaction>, sqlx::Error> {
    let rec = sqlx::query_as::<_, AccountTransaction>(&format!(
        "SELECT {TX_COLUMNS} FROM account_transaction WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn get_transaction_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<AccountTransaction>, sqlx::Error> {
    let rec = sqlx::query_as::<_, AccountTransaction>(&format!(
        "SELECT {TX_COLUMNS} FROM account_transaction WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn first_transaction(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Option<AccountTransaction>, sqlx::Error> {
    let rec = sqlx::query_as::<_, AccountTransaction>(&format!(
        r#"
        SELECT {TX_COLUMNS} FROM account_transaction
        WHERE account_id = $1
        ORDER BY created_at ASC
        LIMIT 1
        "#,
    ))
    .bind(account_id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn first_transaction_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
) -> Result<Option<AccountTransaction>, sqlx::Error> {
    let rec = sqlx::query_as::<_, AccountTransaction>(&format!(
        r#"
        SELECT {TX_COLUMNS} FROM account_transaction
        WHERE account_id = $1
        ORDER BY created_at ASC
        LIMIT 1
        "#,
    ))
    .bind(account_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn list_transactions(
    pool: &PgPool,
    account_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<AccountTransaction>, sqlx::Error> {
    let recs = sqlx::query_as::<_, AccountTransaction>(&format!(
        r#"
        SELECT {TX_COLUMNS} FROM account_transaction
        WHERE account_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    ))
    .bind(account_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(recs)
}

pub async fn sum_transactions(pool: &PgPool, account_id: Uuid) -> Result<Decimal, sqlx::Error> {
    let total: (Option<Decimal>,) =
        sqlx::query_as("SELECT SUM(amount) FROM account_transaction WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(pool)
            .await?;
    Ok(total.0.unwrap_or(Decimal::ZERO))
}

pub async fn set_balance(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    balance: Decimal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE account
        SET denormalized_balance = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .bind(balance)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn list_account_ids(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT id FROM account ORDER BY created_at LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}
