//! 操作管道状态机
//!
//! mark_* 都是简单的状态写入，配合数据库侧的状态守卫做 CAS；
//! 任何核心调用都不会同步等待网络确认。
//! 取消与资金回退共享一个事务：要么操作取消且资金回到原账户，
//! 要么两者都没发生。广播后的失败只记录，不自动回退。

use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    domain::{
        address::{ensure_length, ADDRESS_LENGTH, TXID_LENGTH},
        operation::{OperationKind, OperationState},
    },
    error::{CoreError, Result},
    infrastructure::db::PgPool,
    repository::{
        accounts, addresses,
        assets::{self, Asset, CreateAssetInput},
        operations::{self, CryptoOperation},
    },
    service::ledger,
};

/// 导入代币时执行器扫描到的合约信息与持仓
#[derive(Debug, Clone)]
pub struct TokenImportInfo {
    pub name: String,
    pub symbol: Option<String>,
    pub supply: Decimal,
    pub balances: Vec<TokenHolding>,
}

#[derive(Debug, Clone)]
pub struct TokenHolding {
    pub address: Vec<u8>,
    pub amount: Decimal,
}

#[derive(Clone)]
pub struct OperationPipeline {
    pool: PgPool,
}

impl OperationPipeline {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<CryptoOperation> {
        operations::get(&self.pool, id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "crypto_operation",
                id,
            })
    }

    /// 本地/初始广播步骤已尝试完成
    pub async fn mark_performed(&self, id: Uuid) -> Result<CryptoOperation> {
        match operations::set_performed(&self.pool, id).await? {
            Some(op) => Ok(op),
            None => Err(self.transition_error(id, OperationState::Pending).await?),
        }
    }

    /// 交易已在网络上传播
    pub async fn mark_broadcasted(&self, id: Uuid) -> Result<CryptoOperation> {
        match operations::set_broadcasted(&self.pool, id).await? {
            Some(op) => Ok(op),
            None => {
                Err(self
                    .transition_error(id, OperationState::Broadcasted)
                    .await?)
            }
        }
    }

    /// 操作定稿，不再有任何变化
    pub async fn mark_complete(&self, id: Uuid) -> Result<CryptoOperation> {
        match operations::set_complete(&self.pool, id).await? {
            Some(op) => Ok(op),
            None => Err(self.transition_error(id, OperationState::Success).await?),
        }
    }

    /// 操作失败
    ///
    /// 广播后的失败也走这里：真实链上结局不明，资金不自动回退，
    /// 留给人工对账处理。
    pub async fn mark_failed(&self, id: Uuid, reason: Option<&str>) -> Result<CryptoOperation> {
        match operations::set_failed(&self.pool, id, reason).await? {
            Some(op) => {
                tracing::warn!(operation = %id, reason = ?reason, "Operation failed");
                Ok(op)
            }
            None => Err(self.transition_error(id, OperationState::Failed).await?),
        }
    }

    /// 广播前取消，并自动把托管资金退回原账户
    pub async fn mark_cancelled(&self, id: Uuid, reason: Option<&str>) -> Result<CryptoOperation> {
        let mut tx = self.pool.begin().await?;
        let op = match operations::set_cancelled(&mut tx, id, reason).await? {
            Some(op) => op,
            None => {
                drop(tx);
                return Err(self.transition_error(id, OperationState::Cancelled).await?);
            }
        };

        reverse_in_tx(&mut tx, &op).await?;
        tx.commit().await?;

        tracing::info!(operation = %id, reason = ?reason, "Operation cancelled and reversed");
        Ok(op)
    }

    /// 结算并完成
    ///
    /// 存款与发币在这里把托管账户清算进真实账户；其余类型直接完成。
    /// 已完成的操作直接返回，不做第二次结算。
    pub async fn resolve(&self, id: Uuid) -> Result<CryptoOperation> {
        let op = self.get(id).await?;
        if op.is_completed() {
            return Ok(op);
        }

        let caps = op.op_kind()?.caps();
        if !caps.settles_holding_on_resolve {
            return self.mark_complete(id).await;
        }

        let holding_id = op
            .holding_account_id
            .ok_or(CoreError::MissingHoldingAccount { operation_id: id })?;
        let crypto_account_id = op
            .crypto_account_id
            .ok_or(CoreError::MissingHoldingAccount { operation_id: id })?;

        let mut tx = self.pool.begin().await?;
        let incoming = accounts::first_transaction_in_tx(&mut tx, holding_id)
            .await?
            .ok_or(CoreError::MissingHoldingAccount { operation_id: id })?;
        let crypto_account = addresses::get_account_in_tx(&mut tx, crypto_account_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "crypto_address_account",
                id: crypto_account_id,
            })?;

        ledger::transfer_in_tx(
            &mut tx,
            incoming.amount,
            holding_id,
            crypto_account.account_id,
            incoming.message.as_deref(),
        )
        .await?;

        let op = operations::set_complete(&mut *tx, id).await?.ok_or(
            CoreError::InvalidStateTransition {
                from: op.op_state()?,
                to: OperationState::Success,
            },
        )?;
        tx.commit().await?;

        tracing::info!(operation = %id, "Operation settled and completed");
        Ok(op)
    }

    /// 确认数推进
    ///
    /// 达到要求的确认数后结算；已完成的操作上重复调用不改变任何东西。
    pub async fn update_confirmations(&self, id: Uuid, confirmation_count: i64) -> Result<bool> {
        let op = self.get(id).await?;
        if op.is_completed() {
            return Ok(false);
        }

        let required = op
            .required_confirmation_count
            .ok_or(CoreError::UnsupportedKind {
                kind: op.op_kind()?,
                action: "confirmation tracking",
            })?;

        if confirmation_count > i64::from(required) {
            self.resolve(id).await?;
            return Ok(true);
        }

        Ok(false)
    }

    /// 回填链上交易 id 与所在区块
    pub async fn attach_transaction(
        &self,
        id: Uuid,
        txid: &[u8],
        block: Option<i64>,
    ) -> Result<CryptoOperation> {
        ensure_length("txid", TXID_LENGTH, txid)?;
        operations::attach_txid(&self.pool, id, txid, block)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "crypto_operation",
                id,
            })
    }

    pub async fn record_block(&self, id: Uuid, block: i64) -> Result<CryptoOperation> {
        operations::set_block(&self.pool, id, block)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "crypto_operation",
                id,
            })
    }

    /// 建址完成：回填 20 字节地址并定稿
    pub async fn complete_address_creation(
        &self,
        id: Uuid,
        address: &[u8],
        txid: Option<&[u8]>,
        block: Option<i64>,
    ) -> Result<CryptoOperation> {
        ensure_length("address", ADDRESS_LENGTH, address)?;
        let op = self.get(id).await?;
        if op.op_kind()? != OperationKind::CreateAddress {
            return Err(CoreError::UnsupportedKind {
                kind: op.op_kind()?,
                action: "address creation completion",
            });
        }

        let address_id = op.address_id.ok_or(CoreError::NotFound {
            entity: "crypto_address",
            id,
        })?;
        addresses::set_address(&self.pool, address_id, address)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "crypto_address",
                id: address_id,
            })?;
        operations::set_external_address(&self.pool, id, address).await?;
        if let Some(txid) = txid {
            self.attach_transaction(id, txid, block).await?;
        }

        self.mark_performed(id).await?;
        let op = self.mark_complete(id).await?;
        tracing::info!(
            operation = %id,
            address = %crate::domain::address::format_address(address),
            "Address creation completed"
        );
        Ok(op)
    }

    /// 导入完成：建资产并按扫描到的持仓给地址账户播种余额
    ///
    /// 中途失败把操作标记为 failed 并带上原因；已播种的部分保留，
    /// 不做回滚。
    pub async fn complete_token_import(
        &self,
        id: Uuid,
        info: TokenImportInfo,
    ) -> Result<Asset> {
        let op = self.get(id).await?;
        if op.op_kind()? != OperationKind::ImportToken {
            return Err(CoreError::UnsupportedKind {
                kind: op.op_kind()?,
                action: "token import completion",
            });
        }
        let contract_address = op.external_address.clone().ok_or(CoreError::NotFound {
            entity: "crypto_operation",
            id,
        })?;

        let asset = match self.import_asset(&op, &info, &contract_address).await {
            Ok(asset) => asset,
            Err(e) => {
                self.mark_failed(id, Some(&e.to_string())).await?;
                return Err(e);
            }
        };

        if let Err(e) = self.seed_imported_balances(&op, &asset, &info.balances).await {
            // 半成品资产明确容忍，原因落在操作上
            self.mark_failed(id, Some(&e.to_string())).await?;
            return Err(e);
        }

        self.mark_performed(id).await?;
        self.mark_complete(id).await?;
        Ok(asset)
    }

    async fn import_asset(
        &self,
        op: &CryptoOperation,
        info: &TokenImportInfo,
        contract_address: &[u8],
    ) -> Result<Asset> {
        let asset = assets::create(
            &self.pool,
            CreateAssetInput {
                network_id: op.network_id,
                name: info.name.clone(),
                symbol: info.symbol.clone(),
                description: None,
                supply: info.supply,
                asset_class: crate::domain::asset::AssetClass::Token,
            },
        )
        .await?;
        assets::set_external_id(&self.pool, asset.id, contract_address).await
    }

    async fn seed_imported_balances(
        &self,
        op: &CryptoOperation,
        asset: &Asset,
        balances: &[TokenHolding],
    ) -> Result<()> {
        for holding in balances {
            if holding.amount <= Decimal::ZERO {
                continue;
            }

            let address =
                addresses::get_by_address(&self.pool, op.network_id, &holding.address)
                    .await?;
            let Some(address) = address else {
                // 不托管的地址不建账
                continue;
            };

            let mut tx = self.pool.begin().await?;
            let crypto_account = crate::service::address_manager::get_or_create_account_in_tx(
                &mut tx, address.id, asset.id,
            )
            .await?;
            ledger::do_withdraw_or_deposit_in_tx(
                &mut tx,
                crypto_account.account_id,
                holding.amount,
                Some("Token contract import"),
                false,
            )
            .await?;
            tx.commit().await?;
        }
        Ok(())
    }

    /// CAS 失败时构造准确的转换错误
    async fn transition_error(&self, id: Uuid, target: OperationState) -> Result<CoreError> {
        let op = self.get(id).await?;
        Ok(CoreError::InvalidStateTransition {
            from: op.op_state()?,
            to: target,
        })
    }
}

/// 按能力表分派资金回退，取消事务内调用
async fn reverse_in_tx(tx: &mut Transaction<'_, Postgres>, op: &CryptoOperation) -> Result<()> {
    let kind = op.op_kind()?;
    let caps = kind.caps();

    // 缺少预期对手方状态的类型（存款、发币、导入）属于调用方用错状态机
    if !caps.reversible {
        return Err(CoreError::NotReversible {
            operation_id: op.id,
            kind,
        });
    }

    // 没搬过资金的操作（建址）放弃即可
    if !caps.moves_value {
        return Ok(());
    }

    // 提现：托管账户的那笔入金原路退回源账户
    let holding_id = op.holding_account_id.ok_or(CoreError::MissingHoldingAccount {
        operation_id: op.id,
    })?;
    let escrow_tx = accounts::first_transaction_in_tx(tx, holding_id)
        .await?
        .ok_or(CoreError::MissingHoldingAccount {
            operation_id: op.id,
        })?;
    ledger::reverse_in_tx(tx, escrow_tx.id).await?;
    Ok(())
}
