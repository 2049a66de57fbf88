//! 双式记账账本
//!
//! 余额缓存增量维护，与流水插入同一事务落库。
//! 并发转账通过行级锁串行化：同一账户的两笔并发扣款绝不会合谋透支。

use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    domain::asset::AssetState,
    error::{CoreError, Result},
    infrastructure::db::PgPool,
    repository::{
        accounts::{self, Account, AccountTransaction},
        assets,
    },
};

#[derive(Clone)]
pub struct Ledger {
    pool: PgPool,
}

impl Ledger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 读缓存余额
    pub async fn get_balance(&self, account_id: Uuid) -> Result<Decimal> {
        let account = accounts::get(&self.pool, account_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "account",
                id: account_id,
            })?;
        Ok(account.denormalized_balance)
    }

    pub async fn get_account(&self, account_id: Uuid) -> Result<Account> {
        accounts::get(&self.pool, account_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "account",
                id: account_id,
            })
    }

    /// 单边入账/出账
    ///
    /// 没有对手方流水，主要用于初始化余额和外部入金的托管侧。
    /// `allow_negative` 仅供内部托管扣款使用。
    pub async fn do_withdraw_or_deposit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        note: Option<&str>,
        allow_negative: bool,
    ) -> Result<AccountTransaction> {
        let mut tx = self.pool.begin().await?;
        let rec =
            do_withdraw_or_deposit_in_tx(&mut tx, account_id, amount, note, allow_negative).await?;
        tx.commit().await?;
        Ok(rec)
    }

    /// 账户间转账：借记 + 贷记 + 互相指向的对手方链接，一个事务内完成
    pub async fn transfer(
        &self,
        amount: Decimal,
        from: Uuid,
        to: Uuid,
        note: Option<&str>,
    ) -> Result<(AccountTransaction, AccountTransaction)> {
        let mut tx = self.pool.begin().await?;
        let pair = transfer_in_tx(&mut tx, amount, from, to, note).await?;
        tx.commit().await?;

        tracing::debug!(
            amount = %amount,
            from = %from,
            to = %to,
            "Transfer committed"
        );
        Ok(pair)
    }

    /// 把一笔转账原路退回对手方账户
    pub async fn reverse(
        &self,
        transaction_id: Uuid,
    ) -> Result<(AccountTransaction, AccountTransaction)> {
        let mut tx = self.pool.begin().await?;
        let pair = reverse_in_tx(&mut tx, transaction_id).await?;
        tx.commit().await?;
        Ok(pair)
    }
}

pub(crate) async fn do_withdraw_or_deposit_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    amount: Decimal,
    note: Option<&str>,
    allow_negative: bool,
) -> Result<AccountTransaction> {
    let account = accounts::lock_for_update(tx, account_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "account",
            id: account_id,
        })?;

    // 冻结资产挡住一切入账，已有余额不受影响
    if amount > Decimal::ZERO {
        ensure_account_not_frozen(tx, &account).await?;
    }

    if amount < Decimal::ZERO
        && !allow_negative
        && account.denormalized_balance + amount < Decimal::ZERO
    {
        return Err(CoreError::AccountOverdrawn {
            account_id,
            balance: account.denormalized_balance,
            requested: amount.abs(),
        });
    }

    let rec = accounts::insert_transaction(tx, account_id, amount, note).await?;
    accounts::apply_balance_delta(tx, account_id, amount).await?;

    Ok(rec)
}

pub(crate) async fn transfer_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    amount: Decimal,
    from: Uuid,
    to: Uuid,
    note: Option<&str>,
) -> Result<(AccountTransaction, AccountTransaction)> {
    // 固定加锁顺序，避免两笔反向转账互相死锁
    let (first, second) = if from <= to { (from, to) } else { (to, from) };
    let first_account = accounts::lock_for_update(tx, first)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "account",
            id: first,
        })?;
    let second_account = if second == first {
        first_account.clone()
    } else {
        accounts::lock_for_update(tx, second)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "account",
                id: second,
            })?
    };

    let (from_account, to_account) = if first == from {
        (first_account, second_account)
    } else {
        (second_account, first_account)
    };

    if from_account.asset_id != to_account.asset_id {
        return Err(CoreError::IncompatibleAssets {
            from_asset: from_account.asset_id,
            to_asset: to_account.asset_id,
        });
    }

    ensure_account_not_frozen(tx, &from_account).await?;

    if from_account.denormalized_balance < amount {
        return Err(CoreError::AccountOverdrawn {
            account_id: from,
            balance: from_account.denormalized_balance,
            requested: amount,
        });
    }

    let mut withdraw = accounts::insert_transaction(tx, from, -amount, note).await?;
    accounts::apply_balance_delta(tx, from, -amount).await?;
    let mut deposit = accounts::insert_transaction(tx, to, amount, note).await?;
    accounts::apply_balance_delta(tx, to, amount).await?;

    accounts::link_counterparties(tx, withdraw.id, deposit.id).await?;
    withdraw.counterparty_id = Some(deposit.id);
    deposit.counterparty_id = Some(withdraw.id);

    Ok((withdraw, deposit))
}

pub(crate) async fn reverse_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    transaction_id: Uuid,
) -> Result<(AccountTransaction, AccountTransaction)> {
    let rec = accounts::get_transaction_in_tx(tx, transaction_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "account_transaction",
            id: transaction_id,
        })?;

    let counterparty_id = rec
        .counterparty_id
        .ok_or(CoreError::CounterpartyMissing { transaction_id })?;
    let counterparty = accounts::get_transaction_in_tx(tx, counterparty_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "account_transaction",
            id: counterparty_id,
        })?;

    // 钱退回发送方：正数流水是收款侧，负数流水的收款侧在对手方
    let (from_account, to_account) = if rec.amount >= Decimal::ZERO {
        (rec.account_id, counterparty.account_id)
    } else {
        (counterparty.account_id, rec.account_id)
    };

    let note = format!("Transaction {} reversed", transaction_id);
    transfer_in_tx(tx, rec.amount.abs(), from_account, to_account, Some(&note)).await
}

async fn ensure_account_not_frozen(
    tx: &mut Transaction<'_, Postgres>,
    account: &Account,
) -> Result<()> {
    let asset = assets::get_by_id_in_tx(tx, account.asset_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "asset",
            id: account.asset_id,
        })?;
    if asset.state == AssetState::Frozen.as_str() {
        return Err(CoreError::AssetFrozen {
            asset_id: asset.id,
        });
    }
    Ok(())
}
