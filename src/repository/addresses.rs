use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::infrastructure::db::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CryptoAddress {
    pub id: Uuid,
    pub network_id: Uuid,
    // NULL until the creation operation resolves
    pub address: Option<Vec<u8>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CryptoAddressAccount {
    pub id: Uuid,
    pub address_id: Uuid,
    pub account_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

const ADDRESS_COLUMNS: &str = "id, network_id, address, created_at";
const ADDRESS_ACCOUNT_COLUMNS: &str = "id, address_id, account_id, created_at";

pub async fn create(pool: &PgPool, network_id: Uuid) -> Result<CryptoAddress, sqlx::Error> {
    let rec = sqlx::query_as::<_, CryptoAddress>(&format!(
        "INSERT INTO crypto_address (network_id) VALUES ($1) RETURNING {ADDRESS_COLUMNS}",
    ))
    .bind(network_id)
    .fetch_one(pool)
    .await?;
    Ok(rec)
}

pub async fn create_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    network_id: Uuid,
) -> Result<CryptoAddress, sqlx::Error> {
    let rec = sqlx::query_as::<_, CryptoAddress>(&format!(
        "INSERT INTO crypto_address (network_id) VALUES ($1) RETURNING {ADDRESS_COLUMNS}",
    ))
    .bind(network_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<CryptoAddress>, sqlx::Error> {
    let rec = sqlx::query_as::<_, CryptoAddress>(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM crypto_address WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn get_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<CryptoAddress>, sqlx::Error> {
    let rec = sqlx::query_as::<_, CryptoAddress>(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM crypto_address WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn get_account_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<CryptoAddressAccount>, sqlx::Error> {
    let rec = sqlx::query_as::<_, CryptoAddressAccount>(&format!(
        "SELECT {ADDRESS_ACCOUNT_COLUMNS} FROM crypto_address_account WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn get_by_address(
    pool: &PgPool,
    network_id: Uuid,
    address: &[u8],
) -> Result<Option<CryptoAddress>, sqlx::Error> {
    let rec = sqlx::query_as::<_, CryptoAddress>(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM crypto_address WHERE network_id = $1 AND address = $2",
    ))
    .bind(network_id)
    .bind(address)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn list_populated(
    pool: &PgPool,
    network_id: Uuid,
) -> Result<Vec<CryptoAddress>, sqlx::Error> {
    let recs = sqlx::query_as::<_, CryptoAddress>(&format!(
        r#"
        SELECT {ADDRESS_COLUMNS} FROM crypto_address
        WHERE network_id = $1 AND address IS NOT NULL
        ORDER BY created_at
        "#,
    ))
    .bind(network_id)
    .fetch_all(pool)
    .await?;
    Ok(recs)
}

pub async fn set_address(
    pool: &PgPool,
    id: Uuid,
    address: &[u8],
) -> Result<Option<CryptoAddress>, sqlx::Error> {
    let rec = sqlx::query_as::<_, CryptoAddress>(&format!(
        "UPDATE crypto_address SET address = $2 WHERE id = $1 RETURNING {ADDRESS_COLUMNS}",
    ))
    .bind(id)
    .bind(address)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn insert_account(
    tx: &mut Transaction<'_, Postgres>,
    address_id: Uuid,
    account_id: Uuid,
) -> Result<CryptoAddressAccount, sqlx::Error> {
    let rec = sqlx::query_as::<_, CryptoAddressAccount>(&format!(
        r#"
        INSERT INTO crypto_address_account (address_id, account_id)
        VALUES ($1, $2)
        RETURNING {ADDRESS_ACCOUNT_COLUMNS}
        "#,
    ))
    .bind(address_id)
    .bind(account_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn get_account(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<CryptoAddressAccount>, sqlx::Error> {
    let rec = sqlx::query_as::<_, CryptoAddressAccount>(&format!(
        "SELECT {ADDRESS_ACCOUNT_COLUMNS} FROM crypto_address_account WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

// One account per asset under one address.
pub async fn find_account_for_asset(
    tx: &mut Transaction<'_, Postgres>,
    address_id: Uuid,
    asset_id: Uuid,
) -> Result<Option<CryptoAddressAccount>, sqlx::Error> {
    let rec = sqlx::query_as::<_, CryptoAddressAccount>(
        r#"
        SELECT caa.id, caa.address_id, caa.account_id, caa.created_at
        FROM crypto_address_account caa
        JOIN account a ON a.id = caa.account_id
        WHERE caa.address_id = $1 AND a.asset_id = $2
        "#,
    )
    .bind(address_id)
    .bind(asset_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn list_accounts(
    pool: &PgPool,
    address_id: Uuid,
) -> Result<Vec<CryptoAddressAccount>, sqlx::Error> {
    let recs = sqlx::query_as::<_, CryptoAddressAccount>(&format!(
        r#"
        SELECT {ADDRESS_ACCOUNT_COLUMNS} FROM crypto_address_account
        WHERE address_id = $1
        ORDER BY created_at
        "#,
    ))
    .bind(address_id)
    .fetch_all(pool)
    .await?;
    Ok(recs)
}
