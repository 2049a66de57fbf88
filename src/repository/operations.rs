use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    domain::operation::{OperationKind, OperationState},
    error::Result,
    infrastructure::db::PgPool,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CryptoOperation {
    pub id: Uuid,
    pub network_id: Uuid,
    pub kind: String,
    pub state: String,
    pub address_id: Option<Uuid>,
    pub crypto_account_id: Option<Uuid>,
    pub holding_account_id: Option<Uuid>,
    pub external_address: Option<Vec<u8>>,
    pub txid: Option<Vec<u8>>,
    pub opid: Option<Vec<u8>>,
    pub block: Option<i64>,
    pub required_confirmation_count: Option<i32>,
    pub attempts: i32,
    pub attempted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub performed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub broadcasted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub failed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub confirmation_deadline_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl CryptoOperation {
    pub fn op_kind(&self) -> Result<OperationKind> {
        OperationKind::parse(&self.kind)
    }

    pub fn op_state(&self) -> Result<OperationState> {
        OperationState::parse(&self.state)
    }

    // An operation has (or will receive) a txid iff a confirmation count is set.
    pub fn tracks_confirmations(&self) -> bool {
        self.required_confirmation_count.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug)]
pub struct InsertOperationInput {
    pub network_id: Uuid,
    pub kind: OperationKind,
    pub state: OperationState,
    pub address_id: Option<Uuid>,
    pub crypto_account_id: Option<Uuid>,
    pub holding_account_id: Option<Uuid>,
    pub external_address: Option<Vec<u8>>,
    pub txid: Option<Vec<u8>>,
    pub opid: Option<Vec<u8>>,
    pub required_confirmation_count: Option<i32>,
}

const OP_COLUMNS: &str = "id, network_id, kind, state, address_id, crypto_account_id, \
                          holding_account_id, external_address, txid, opid, block, \
                          required_confirmation_count, attempts, attempted_at, performed_at, \
                          broadcasted_at, completed_at, failed_at, confirmation_deadline_at, \
                          error, created_at, updated_at";

pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    input: InsertOperationInput,
) -> Result<CryptoOperation> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        INSERT INTO crypto_operation (
            network_id, kind, state, address_id, crypto_account_id, holding_account_id,
            external_address, txid, opid, required_confirmation_count
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(input.network_id)
    .bind(input.kind.as_str())
    .bind(input.state.as_str())
    .bind(input.address_id)
    .bind(input.crypto_account_id)
    .bind(input.holding_account_id)
    .bind(input.external_address)
    .bind(input.txid)
    .bind(input.opid)
    .bind(input.required_confirmation_count)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| super::map_unique_violation(e, "opid"))?;
    Ok(rec)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        "SELECT {OP_COLUMNS} FROM crypto_operation WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

/// Atomic claim. Exactly one worker wins the waiting -> pending CAS;
/// the losers see no row and move on.
pub async fn claim(pool: &PgPool, id: Uuid) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        UPDATE crypto_operation
        SET state = 'pending',
            attempts = attempts + 1,
            attempted_at = CURRENT_TIMESTAMP,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND state = 'waiting'
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn list_waiting_ids(
    pool: &PgPool,
    network_id: Uuid,
    limit: i64,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM crypto_operation
        WHERE network_id = $1 AND state = 'waiting'
        ORDER BY created_at
        LIMIT $2
        "#,
    )
    .bind(network_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn list_by_state(
    pool: &PgPool,
    network_id: Uuid,
    state: OperationState,
    limit: i64,
    offset: i64,
) -> Result<Vec<CryptoOperation>> {
    let recs = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        SELECT {OP_COLUMNS} FROM crypto_operation
        WHERE network_id = $1 AND state = $2
        ORDER BY created_at
        LIMIT $3 OFFSET $4
        "#,
    ))
    .bind(network_id)
    .bind(state.as_str())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(recs)
}

pub async fn find_by_opid(pool: &PgPool, opid: &[u8]) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        "SELECT {OP_COLUMNS} FROM crypto_operation WHERE opid = $1",
    ))
    .bind(opid)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn find_creation_for_address(
    tx: &mut Transaction<'_, Postgres>,
    address_id: Uuid,
) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        SELECT {OP_COLUMNS} FROM crypto_operation
        WHERE address_id = $1 AND kind = 'create_address'
        "#,
    ))
    .bind(address_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn find_token_creation_for_asset(
    tx: &mut Transaction<'_, Postgres>,
    asset_id: Uuid,
) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(
        r#"
        SELECT o.id, o.network_id, o.kind, o.state, o.address_id, o.crypto_account_id,
               o.holding_account_id, o.external_address, o.txid, o.opid, o.block,
               o.required_confirmation_count, o.attempts, o.attempted_at, o.performed_at,
               o.broadcasted_at, o.completed_at, o.failed_at, o.confirmation_deadline_at,
               o.error, o.created_at, o.updated_at
        FROM crypto_operation o
        JOIN account a ON a.id = o.holding_account_id
        WHERE o.kind = 'create_token' AND a.asset_id = $1
        "#,
    )
    .bind(asset_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(rec)
}

/// Operations still waiting for block confirmations.
pub async fn list_unresolved_tracked(
    pool: &PgPool,
    network_id: Uuid,
    limit: i64,
) -> Result<Vec<CryptoOperation>> {
    let recs = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        SELECT {OP_COLUMNS} FROM crypto_operation
        WHERE network_id = $1
          AND required_confirmation_count IS NOT NULL
          AND completed_at IS NULL
          AND state NOT IN ('failed', 'cancelled')
        ORDER BY created_at
        LIMIT $2
        "#,
    ))
    .bind(network_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(recs)
}

pub async fn list_confirmation_overdue(pool: &PgPool, limit: i64) -> Result<Vec<CryptoOperation>> {
    let recs = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        SELECT {OP_COLUMNS} FROM crypto_operation
        WHERE state = 'confirmation_required'
          AND confirmation_deadline_at IS NOT NULL
          AND confirmation_deadline_at < CURRENT_TIMESTAMP
        ORDER BY confirmation_deadline_at
        LIMIT $1
        "#,
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(recs)
}

// State writes below are compare-and-swap on the current state. A None return
// means the guard did not match and the caller maps it to a transition error.

pub async fn set_performed(pool: &PgPool, id: Uuid) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        UPDATE crypto_operation
        SET state = 'pending', performed_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND state IN ('waiting', 'pending')
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn set_broadcasted(pool: &PgPool, id: Uuid) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        UPDATE crypto_operation
        SET state = 'broadcasted', broadcasted_at = CURRENT_TIMESTAMP,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND state = 'pending'
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn set_complete<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    id: Uuid,
) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        UPDATE crypto_operation
        SET state = 'success', completed_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND state IN ('confirmation_required', 'waiting', 'pending', 'broadcasted')
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;
    Ok(rec)
}

pub async fn set_failed(
    pool: &PgPool,
    id: Uuid,
    reason: Option<&str>,
) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        UPDATE crypto_operation
        SET state = 'failed', failed_at = CURRENT_TIMESTAMP, error = $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND state IN ('confirmation_required', 'waiting', 'pending', 'broadcasted')
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(reason)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

// Cancellation shares the transaction with the escrow reversal.
pub async fn set_cancelled(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    reason: Option<&str>,
) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        UPDATE crypto_operation
        SET state = 'cancelled', failed_at = CURRENT_TIMESTAMP, error = $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
          AND state IN ('confirmation_required', 'waiting', 'pending')
          AND broadcasted_at IS NULL
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(reason)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn set_confirmation_required(
    pool: &PgPool,
    id: Uuid,
    deadline: chrono::DateTime<chrono::Utc>,
) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        UPDATE crypto_operation
        SET state = 'confirmation_required', confirmation_deadline_at = $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND state = 'waiting'
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(deadline)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn set_waiting_after_approval(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        UPDATE crypto_operation
        SET state = 'waiting', confirmation_deadline_at = NULL, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND state = 'confirmation_required'
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn attach_txid(
    pool: &PgPool,
    id: Uuid,
    txid: &[u8],
    block: Option<i64>,
) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        UPDATE crypto_operation
        SET txid = $2, block = $3, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(txid)
    .bind(block)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn set_external_address(
    pool: &PgPool,
    id: Uuid,
    external_address: &[u8],
) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        UPDATE crypto_operation
        SET external_address = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(external_address)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn set_block(pool: &PgPool, id: Uuid, block: i64) -> Result<Option<CryptoOperation>> {
    let rec = sqlx::query_as::<_, CryptoOperation>(&format!(
        r#"
        UPDATE crypto_operation
        SET block = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING {OP_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(block)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}
