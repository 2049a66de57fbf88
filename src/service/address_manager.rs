//! 地址与操作入队服务
//!
//! 所有写链动作都从这里入队：建址、存款登记、提现、发币、代币导入。
//! 资金预留（托管账户入金）与操作行的创建共享同一个数据库事务，
//! 进程在提交后崩溃则预留仍然成立，提交前崩溃则什么都没发生。

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    domain::{
        address::{ensure_length, make_opid, ADDRESS_LENGTH, TXID_LENGTH},
        operation::{OperationKind, OperationState},
    },
    error::{CoreError, Result},
    infrastructure::db::PgPool,
    repository::{
        accounts, addresses,
        addresses::{CryptoAddress, CryptoAddressAccount},
        assets, networks,
        operations::{self, CryptoOperation, InsertOperationInput},
    },
    service::ledger,
};

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::NonPositiveAmount { amount });
    }
    Ok(())
}

#[derive(Clone)]
pub struct AddressManager {
    pool: PgPool,
    default_confirmation_count: i32,
}

impl AddressManager {
    pub fn new(pool: PgPool, default_confirmation_count: i32) -> Self {
        Self {
            pool,
            default_confirmation_count,
        }
    }

    /// 发起建址操作
    ///
    /// 地址行先以空地址落库，节点侧创建完成后由管道回填 20 字节地址。
    pub async fn create_address(
        &self,
        network_id: Uuid,
        required_confirmation_count: Option<i32>,
    ) -> Result<(CryptoAddress, CryptoOperation)> {
        networks::get_by_id(&self.pool, network_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "asset_network",
                id: network_id,
            })?;

        let mut tx = self.pool.begin().await?;
        let address = addresses::create_in_tx(&mut tx, network_id).await?;

        // 一个地址只允许一个创建操作排队
        if operations::find_creation_for_address(&mut tx, address.id)
            .await?
            .is_some()
        {
            return Err(CoreError::MultipleCreationOperations {
                address_id: address.id,
            });
        }

        let op = operations::insert(
            &mut tx,
            InsertOperationInput {
                network_id,
                kind: OperationKind::CreateAddress,
                state: OperationState::Waiting,
                address_id: Some(address.id),
                crypto_account_id: None,
                holding_account_id: None,
                external_address: None,
                txid: None,
                opid: None,
                required_confirmation_count,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(address = %address.id, operation = %op.id, "Address creation queued");
        Ok((address, op))
    }

    /// 在地址下为某资产开账户
    pub async fn create_account(
        &self,
        address_id: Uuid,
        asset_id: Uuid,
    ) -> Result<CryptoAddressAccount> {
        let mut tx = self.pool.begin().await?;
        let account = create_account_in_tx(&mut tx, address_id, asset_id).await?;
        tx.commit().await?;
        Ok(account)
    }

    pub async fn get_or_create_account(
        &self,
        address_id: Uuid,
        asset_id: Uuid,
    ) -> Result<CryptoAddressAccount> {
        let mut tx = self.pool.begin().await?;
        let account = get_or_create_account_in_tx(&mut tx, address_id, asset_id).await?;
        tx.commit().await?;
        Ok(account)
    }

    /// 登记一笔外部转入
    ///
    /// 资金先进操作自有的托管账户，确认数达标后才结算进真实账户。
    /// 同一 txid + 日志序号重复登记时返回已存在的操作，不会入账两次。
    pub async fn deposit(
        &self,
        address_id: Uuid,
        asset_id: Uuid,
        amount: Decimal,
        txid: &[u8],
        log_index: u16,
        note: Option<&str>,
        required_confirmation_count: Option<i32>,
    ) -> Result<CryptoOperation> {
        ensure_positive(amount)?;
        ensure_length("txid", TXID_LENGTH, txid)?;
        let opid = make_opid(txid, log_index)?;

        if let Some(existing) = operations::find_by_opid(&self.pool, &opid).await? {
            return Ok(existing);
        }

        let required = required_confirmation_count.unwrap_or(self.default_confirmation_count);

        let mut tx = self.pool.begin().await?;
        let network_id = address_network(&mut tx, address_id).await?;
        let crypto_account = get_or_create_account_in_tx(&mut tx, address_id, asset_id).await?;
        let holding = accounts::create_in_tx(&mut tx, asset_id).await?;

        let op = match operations::insert(
            &mut tx,
            InsertOperationInput {
                network_id,
                kind: OperationKind::Deposit,
                state: OperationState::Waiting,
                address_id: None,
                crypto_account_id: Some(crypto_account.id),
                holding_account_id: Some(holding.id),
                external_address: None,
                txid: Some(txid.to_vec()),
                opid: Some(opid.clone()),
                required_confirmation_count: Some(required),
            },
        )
        .await
        {
            Ok(op) => op,
            // 并发登记同一笔转入：让赢家先提交，再返回它的操作
            Err(CoreError::DuplicateAsset { constraint }) => {
                drop(tx);
                if let Some(existing) = operations::find_by_opid(&self.pool, &opid).await? {
                    return Ok(existing);
                }
                return Err(CoreError::DuplicateAsset { constraint });
            }
            Err(e) => return Err(e),
        };

        ledger::do_withdraw_or_deposit_in_tx(&mut tx, holding.id, amount, note, false).await?;
        tx.commit().await?;

        tracing::info!(operation = %op.id, amount = %amount, "Deposit registered");
        Ok(op)
    }

    /// 发起提现，资金锁入托管账户
    pub async fn withdraw(
        &self,
        crypto_account_id: Uuid,
        amount: Decimal,
        to_address: &[u8],
        note: Option<&str>,
        required_confirmation_count: Option<i32>,
    ) -> Result<CryptoOperation> {
        ensure_positive(amount)?;
        ensure_length("address", ADDRESS_LENGTH, to_address)?;

        let required = required_confirmation_count.unwrap_or(self.default_confirmation_count);

        let mut tx = self.pool.begin().await?;
        let crypto_account = addresses::get_account_in_tx(&mut tx, crypto_account_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "crypto_address_account",
                id: crypto_account_id,
            })?;
        let account = accounts::lock_for_update(&mut tx, crypto_account.account_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "account",
                id: crypto_account.account_id,
            })?;
        let asset = assets::get_by_id_in_tx(&mut tx, account.asset_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "asset",
                id: account.asset_id,
            })?;
        crate::service::asset_registry::ensure_not_frozen(&asset)?;

        let holding = accounts::create_in_tx(&mut tx, account.asset_id).await?;
        let op = operations::insert(
            &mut tx,
            InsertOperationInput {
                network_id: asset.network_id,
                kind: OperationKind::Withdraw,
                state: OperationState::Waiting,
                address_id: None,
                crypto_account_id: Some(crypto_account.id),
                holding_account_id: Some(holding.id),
                external_address: Some(to_address.to_vec()),
                txid: None,
                opid: None,
                required_confirmation_count: Some(required),
            },
        )
        .await?;

        // 资金锁进托管账户，用户在操作存续期间无法二次花费
        ledger::transfer_in_tx(&mut tx, amount, account.id, holding.id, note).await?;
        tx.commit().await?;

        tracing::info!(operation = %op.id, amount = %amount, "Withdraw queued");
        Ok(op)
    }

    /// 发起代币合约创建，初始供应量入托管账户
    pub async fn create_token(
        &self,
        address_id: Uuid,
        asset_id: Uuid,
        required_confirmation_count: Option<i32>,
    ) -> Result<CryptoOperation> {
        let mut tx = self.pool.begin().await?;
        let asset = assets::get_by_id_in_tx(&mut tx, asset_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "asset",
                id: asset_id,
            })?;
        ensure_positive(asset.supply)?;

        if operations::find_token_creation_for_asset(&mut tx, asset_id)
            .await?
            .is_some()
        {
            return Err(CoreError::TokenAlreadyCreated { asset_id });
        }

        let crypto_account = get_or_create_account_in_tx(&mut tx, address_id, asset_id).await?;
        let holding = accounts::create_in_tx(&mut tx, asset_id).await?;
        let op = operations::insert(
            &mut tx,
            InsertOperationInput {
                network_id: asset.network_id,
                kind: OperationKind::CreateToken,
                state: OperationState::Waiting,
                address_id: None,
                crypto_account_id: Some(crypto_account.id),
                holding_account_id: Some(holding.id),
                external_address: None,
                txid: None,
                opid: None,
                required_confirmation_count: Some(
                    required_confirmation_count.unwrap_or(self.default_confirmation_count),
                ),
            },
        )
        .await?;

        ledger::do_withdraw_or_deposit_in_tx(
            &mut tx,
            holding.id,
            asset.supply,
            Some("Initial supply"),
            false,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(operation = %op.id, asset = %asset_id, "Token creation queued");
        Ok(op)
    }

    /// 发起已有代币合约的导入
    pub async fn import_token(
        &self,
        network_id: Uuid,
        contract_address: &[u8],
    ) -> Result<CryptoOperation> {
        ensure_length("address", ADDRESS_LENGTH, contract_address)?;
        networks::get_by_id(&self.pool, network_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "asset_network",
                id: network_id,
            })?;

        let mut tx = self.pool.begin().await?;
        let op = operations::insert(
            &mut tx,
            InsertOperationInput {
                network_id,
                kind: OperationKind::ImportToken,
                state: OperationState::Waiting,
                address_id: None,
                crypto_account_id: None,
                holding_account_id: None,
                external_address: Some(contract_address.to_vec()),
                txid: None,
                opid: None,
                required_confirmation_count: None,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(operation = %op.id, "Token import queued");
        Ok(op)
    }
}

async fn address_network(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    address_id: Uuid,
) -> Result<Uuid> {
    let address = addresses::get_in_tx(tx, address_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "crypto_address",
            id: address_id,
        })?;
    Ok(address.network_id)
}

pub(crate) async fn create_account_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    address_id: Uuid,
    asset_id: Uuid,
) -> Result<CryptoAddressAccount> {
    let address = addresses::get_in_tx(tx, address_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "crypto_address",
            id: address_id,
        })?;
    let asset = assets::get_by_id_in_tx(tx, asset_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "asset",
            id: asset_id,
        })?;

    if asset.network_id != address.network_id {
        return Err(CoreError::WrongNetwork {
            asset_network: asset.network_id,
            address_network: address.network_id,
        });
    }

    if addresses::find_account_for_asset(tx, address_id, asset_id)
        .await?
        .is_some()
    {
        return Err(CoreError::MultipleAssetAccountsPerAddress {
            address_id,
            asset_id,
        });
    }

    let account = accounts::create_in_tx(tx, asset_id).await?;
    let rec = addresses::insert_account(tx, address_id, account.id).await?;
    Ok(rec)
}

pub(crate) async fn get_or_create_account_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    address_id: Uuid,
    asset_id: Uuid,
) -> Result<CryptoAddressAccount> {
    if let Some(existing) = addresses::find_account_for_asset(tx, address_id, asset_id).await? {
        return Ok(existing);
    }
    create_account_in_tx(tx, address_id, asset_id).await
}
