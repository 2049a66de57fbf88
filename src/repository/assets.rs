use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    domain::asset::{AssetClass, AssetState},
    error::Result,
    infrastructure::db::PgPool,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub id: Uuid,
    pub network_id: Uuid,
    pub name: String,
    pub symbol: Option<String>,
    pub description: Option<String>,
    pub external_id: Option<Vec<u8>>,
    pub supply: Decimal,
    pub asset_class: String,
    pub state: String,
    pub archived_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Asset {
    pub fn class(&self) -> Result<AssetClass> {
        AssetClass::parse(&self.asset_class)
    }

    pub fn asset_state(&self) -> Result<AssetState> {
        AssetState::parse(&self.state)
    }

    pub fn is_publicly_listed(&self) -> bool {
        self.state == AssetState::Public.as_str() && self.archived_at.is_none()
    }
}

#[derive(Debug)]
pub struct CreateAssetInput {
    pub network_id: Uuid,
    pub name: String,
    pub symbol: Option<String>,
    pub description: Option<String>,
    pub supply: Decimal,
    pub asset_class: AssetClass,
}

const ASSET_COLUMNS: &str = "id, network_id, name, symbol, description, external_id, supply, \
                             asset_class, state, archived_at, created_at, updated_at";

pub async fn create(pool: &PgPool, input: CreateAssetInput) -> Result<Asset> {
    let rec = sqlx::query_as::<_, Asset>(&format!(
        r#"
        INSERT INTO asset (network_id, name, symbol, description, supply, asset_class)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {ASSET_COLUMNS}
        "#,
    ))
    .bind(input.network_id)
    .bind(&input.name)
    .bind(&input.symbol)
    .bind(&input.description)
    .bind(input.supply)
    .bind(input.asset_class.as_str())
    .fetch_one(pool)
    .await
    .map_err(|e| super::map_unique_violation(e, "asset"))?;
    Ok(rec)
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Asset>> {
    let rec = sqlx::query_as::<_, Asset>(&format!(
        "SELECT {ASSET_COLUMNS} FROM asset WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn get_by_id_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> Result<Option<Asset>> {
    let rec = sqlx::query_as::<_, Asset>(&format!(
        "SELECT {ASSET_COLUMNS} FROM asset WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(rec)
}

pub async fn get_by_symbol(
    pool: &PgPool,
    network_id: Uuid,
    symbol: &str,
) -> Result<Option<Asset>> {
    let rec = sqlx::query_as::<_, Asset>(&format!(
        "SELECT {ASSET_COLUMNS} FROM asset WHERE network_id = $1 AND symbol = $2",
    ))
    .bind(network_id)
    .bind(symbol)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn get_by_name(pool: &PgPool, network_id: Uuid, name: &str) -> Result<Option<Asset>> {
    let rec = sqlx::query_as::<_, Asset>(&format!(
        "SELECT {ASSET_COLUMNS} FROM asset WHERE network_id = $1 AND name = $2",
    ))
    .bind(network_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn get_by_external_id(
    pool: &PgPool,
    network_id: Uuid,
    external_id: &[u8],
) -> Result<Option<Asset>> {
    let rec = sqlx::query_as::<_, Asset>(&format!(
        "SELECT {ASSET_COLUMNS} FROM asset WHERE network_id = $1 AND external_id = $2",
    ))
    .bind(network_id)
    .bind(external_id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn list_public(pool: &PgPool, network_id: Uuid) -> Result<Vec<Asset>> {
    let recs = sqlx::query_as::<_, Asset>(&format!(
        r#"
        SELECT {ASSET_COLUMNS} FROM asset
        WHERE network_id = $1 AND state = 'public' AND archived_at IS NULL
        ORDER BY name
        "#,
    ))
    .bind(network_id)
    .fetch_all(pool)
    .await?;
    Ok(recs)
}

pub async fn set_external_id(pool: &PgPool, id: Uuid, external_id: &[u8]) -> Result<Asset> {
    let rec = sqlx::query_as::<_, Asset>(&format!(
        r#"
        UPDATE asset SET external_id = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING {ASSET_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(external_id)
    .fetch_one(pool)
    .await
    .map_err(|e| super::map_unique_violation(e, "external_id"))?;
    Ok(rec)
}

pub async fn set_state(pool: &PgPool, id: Uuid, state: AssetState) -> Result<Option<Asset>> {
    let rec = sqlx::query_as::<_, Asset>(&format!(
        r#"
        UPDATE asset SET state = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING {ASSET_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(state.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn set_archived_at(
    pool: &PgPool,
    id: Uuid,
    archived_at: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<Option<Asset>> {
    let rec = sqlx::query_as::<_, Asset>(&format!(
        r#"
        UPDATE asset SET archived_at = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING {ASSET_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(archived_at)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

// Sum of everything we hold on internal accounts for this asset.
pub async fn local_liabilities(pool: &PgPool, asset_id: Uuid) -> Result<Decimal> {
    let total: (Option<Decimal>,) = sqlx::query_as(
        "SELECT SUM(denormalized_balance) FROM account WHERE asset_id = $1",
    )
    .bind(asset_id)
    .fetch_one(pool)
    .await?;
    Ok(total.0.unwrap_or(Decimal::ZERO))
}
