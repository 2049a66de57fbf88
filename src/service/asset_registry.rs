//! 资产目录服务
//!
//! 网络内强制 symbol / name / 合约地址唯一，冻结闸门在这里定义、
//! 由账本在每次入账前调用。

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    domain::asset::{AssetClass, AssetState},
    error::{CoreError, Result},
    infrastructure::db::PgPool,
    repository::{
        assets::{self, Asset, CreateAssetInput},
        networks::{self, AssetNetwork},
    },
};

/// 冻结检查，账本每次入账前调用
pub fn ensure_not_frozen(asset: &Asset) -> Result<()> {
    if asset.state == AssetState::Frozen.as_str() {
        return Err(CoreError::AssetFrozen { asset_id: asset.id });
    }
    Ok(())
}

#[derive(Clone)]
pub struct AssetRegistry {
    pool: PgPool,
}

impl AssetRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_or_create_network(&self, name: &str) -> Result<AssetNetwork> {
        if let Some(network) = networks::get_by_name(&self.pool, name).await? {
            return Ok(network);
        }
        let network = networks::create(&self.pool, name, None).await?;
        tracing::info!(network = %network.id, name, "Created asset network");
        Ok(network)
    }

    pub async fn get_network(&self, network_id: Uuid) -> Result<AssetNetwork> {
        networks::get_by_id(&self.pool, network_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "asset_network",
                id: network_id,
            })
    }

    pub async fn create_asset(
        &self,
        network_id: Uuid,
        name: &str,
        symbol: Option<&str>,
        supply: Decimal,
        asset_class: AssetClass,
    ) -> Result<Asset> {
        let asset = assets::create(
            &self.pool,
            CreateAssetInput {
                network_id,
                name: name.to_string(),
                symbol: symbol.map(str::to_string),
                description: None,
                supply,
                asset_class,
            },
        )
        .await?;
        tracing::info!(asset = %asset.id, name, ?symbol, "Created asset");
        Ok(asset)
    }

    pub async fn get_asset(&self, asset_id: Uuid) -> Result<Asset> {
        assets::get_by_id(&self.pool, asset_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "asset",
                id: asset_id,
            })
    }

    pub async fn get_asset_by_symbol(
        &self,
        network_id: Uuid,
        symbol: &str,
    ) -> Result<Option<Asset>> {
        assets::get_by_symbol(&self.pool, network_id, symbol).await
    }

    pub async fn get_asset_by_name(&self, network_id: Uuid, name: &str) -> Result<Option<Asset>> {
        assets::get_by_name(&self.pool, network_id, name).await
    }

    /// 按名称取资产，不存在则创建
    ///
    /// 返回 (资产, 是否新建)
    pub async fn get_or_create_asset_by_name(
        &self,
        network_id: Uuid,
        name: &str,
        symbol: Option<&str>,
        supply: Decimal,
        asset_class: Option<AssetClass>,
    ) -> Result<(Asset, bool)> {
        if let Some(asset) = assets::get_by_name(&self.pool, network_id, name).await? {
            return Ok((asset, false));
        }
        let asset = self
            .create_asset(
                network_id,
                name,
                symbol,
                supply,
                asset_class.unwrap_or(AssetClass::Token),
            )
            .await?;
        Ok((asset, true))
    }

    pub async fn list_public_assets(&self, network_id: Uuid) -> Result<Vec<Asset>> {
        assets::list_public(&self.pool, network_id).await
    }

    pub async fn freeze_asset(&self, asset_id: Uuid) -> Result<Asset> {
        self.set_state(asset_id, AssetState::Frozen).await
    }

    pub async fn unfreeze_asset(&self, asset_id: Uuid) -> Result<Asset> {
        self.set_state(asset_id, AssetState::Public).await
    }

    pub async fn archive_asset(&self, asset_id: Uuid) -> Result<Asset> {
        assets::set_archived_at(&self.pool, asset_id, Some(chrono::Utc::now()))
            .await?
            .ok_or(CoreError::NotFound {
                entity: "asset",
                id: asset_id,
            })
    }

    /// 系统内部账户持有该资产的总量
    pub async fn local_liabilities(&self, asset_id: Uuid) -> Result<Decimal> {
        assets::local_liabilities(&self.pool, asset_id).await
    }

    async fn set_state(&self, asset_id: Uuid, state: AssetState) -> Result<Asset> {
        let asset = assets::set_state(&self.pool, asset_id, state)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "asset",
                id: asset_id,
            })?;
        tracing::info!(asset = %asset_id, state = %state, "Asset state changed");
        Ok(asset)
    }
}
