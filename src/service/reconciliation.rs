//! 余额对账服务
//!
//! 余额缓存平时增量维护，这里定期做全量重算核对：
//! 逐账户比较缓存值与流水合计，报告并可修复漂移。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{CoreError, Result},
    infrastructure::db::PgPool,
    repository::accounts,
};

/// 一个账户的缓存漂移
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDrift {
    pub account_id: Uuid,
    pub cached: Decimal,
    pub computed: Decimal,
}

/// 对账结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub audited_accounts: usize,
    pub drifts: Vec<AccountDrift>,
}

#[derive(Clone)]
pub struct ReconciliationService {
    pool: PgPool,
}

impl ReconciliationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 全量重算核对
    pub async fn audit_balances(&self, batch_size: i64) -> Result<AuditReport> {
        let mut audited = 0usize;
        let mut drifts = Vec::new();
        let mut offset = 0i64;

        loop {
            let ids = accounts::list_account_ids(&self.pool, batch_size, offset).await?;
            if ids.is_empty() {
                break;
            }

            for account_id in &ids {
                let account = accounts::get(&self.pool, *account_id)
                    .await?
                    .ok_or(CoreError::NotFound {
                        entity: "account",
                        id: *account_id,
                    })?;
                let computed = accounts::sum_transactions(&self.pool, *account_id).await?;
                audited += 1;

                if account.denormalized_balance != computed {
                    tracing::warn!(
                        account = %account_id,
                        cached = %account.denormalized_balance,
                        computed = %computed,
                        "Balance cache drift detected"
                    );
                    drifts.push(AccountDrift {
                        account_id: *account_id,
                        cached: account.denormalized_balance,
                        computed,
                    });
                }
            }

            offset += ids.len() as i64;
        }

        if drifts.is_empty() {
            tracing::info!(audited, "Balance audit clean");
        }

        Ok(AuditReport {
            audited_accounts: audited,
            drifts,
        })
    }

    /// 把缓存修复为流水合计，返回修复后的余额
    pub async fn repair_balance(&self, account_id: Uuid) -> Result<Decimal> {
        let mut tx = self.pool.begin().await?;
        accounts::lock_for_update(&mut tx, account_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "account",
                id: account_id,
            })?;

        let computed: (Option<Decimal>,) =
            sqlx::query_as("SELECT SUM(amount) FROM account_transaction WHERE account_id = $1")
                .bind(account_id)
                .fetch_one(&mut *tx)
                .await?;
        let computed = computed.0.unwrap_or(Decimal::ZERO);

        accounts::set_balance(&mut tx, account_id, computed).await?;
        tx.commit().await?;

        tracing::info!(account = %account_id, balance = %computed, "Balance cache repaired");
        Ok(computed)
    }
}
