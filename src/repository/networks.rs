use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::infrastructure::db::PgPool;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct AssetNetwork {
    pub id: Uuid,
    pub name: String,
    pub human_friendly_name: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct NetworkStatus {
    pub network_id: Uuid,
    pub latest_block: Option<i64>,
    pub heartbeat_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl AssetNetwork {
    pub fn display_name(&self) -> &str {
        self.human_friendly_name.as_deref().unwrap_or(&self.name)
    }
}

pub async fn create(
    pool: &PgPool,
    name: &str,
    human_friendly_name: Option<&str>,
) -> Result<AssetNetwork, sqlx::Error> {
    let rec = sqlx::query_as::<_, AssetNetwork>(
        r#"
        INSERT INTO asset_network (name, human_friendly_name)
        VALUES ($1, $2)
        RETURNING id, name, human_friendly_name, created_at
        "#,
    )
    .bind(name)
    .bind(human_friendly_name)
    .fetch_one(pool)
    .await?;
    Ok(rec)
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<AssetNetwork>, sqlx::Error> {
    let rec = sqlx::query_as::<_, AssetNetwork>(
        r#"
        SELECT id, name, human_friendly_name, created_at
        FROM asset_network
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn get_by_name(pool: &PgPool, name: &str) -> Result<Option<AssetNetwork>, sqlx::Error> {
    let rec = sqlx::query_as::<_, AssetNetwork>(
        r#"
        SELECT id, name, human_friendly_name, created_at
        FROM asset_network
        WHERE name = $1
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn get_status(pool: &PgPool, network_id: Uuid) -> Result<Option<NetworkStatus>, sqlx::Error> {
    let rec = sqlx::query_as::<_, NetworkStatus>(
        r#"
        SELECT network_id, latest_block, heartbeat_at
        FROM crypto_network_status
        WHERE network_id = $1
        "#,
    )
    .bind(network_id)
    .fetch_optional(pool)
    .await?;
    Ok(rec)
}

pub async fn upsert_latest_block(
    pool: &PgPool,
    network_id: Uuid,
    latest_block: i64,
) -> Result<NetworkStatus, sqlx::Error> {
    let rec = sqlx::query_as::<_, NetworkStatus>(
        r#"
        INSERT INTO crypto_network_status (network_id, latest_block, heartbeat_at)
        VALUES ($1, $2, CURRENT_TIMESTAMP)
        ON CONFLICT (network_id) DO UPDATE
            SET latest_block = EXCLUDED.latest_block,
                heartbeat_at = CURRENT_TIMESTAMP
        RETURNING network_id, latest_block, heartbeat_at
        "#,
    )
    .bind(network_id)
    .bind(latest_block)
    .fetch_one(pool)
    .await?;
    Ok(rec)
}
