//! 人工审批闸门
//!
//! 把一笔等待中的提现挂起到 confirmation_required，等待带外确认
//! （短信等，具体通道由外部协作方实现）。三个入口：通过、拒绝、超时。
//! 拒绝与超时都走取消路径，托管资金自动回退。

use std::time::Duration;

use uuid::Uuid;

use crate::{
    domain::operation::{OperationKind, OperationState},
    error::{CoreError, Result},
    infrastructure::db::PgPool,
    repository::operations::{self, CryptoOperation},
    service::pipeline::OperationPipeline,
};

#[derive(Clone)]
pub struct ApprovalGate {
    pool: PgPool,
    pipeline: OperationPipeline,
}

impl ApprovalGate {
    pub fn new(pool: PgPool) -> Self {
        let pipeline = OperationPipeline::new(pool.clone());
        Self { pool, pipeline }
    }

    /// 挂起一笔提现，超过 timeout 未确认则会被 expire_overdue 取消
    pub async fn require_approval(&self, id: Uuid, timeout: Duration) -> Result<CryptoOperation> {
        let op = self.pipeline.get(id).await?;
        if op.op_kind()? != OperationKind::Withdraw {
            return Err(CoreError::UnsupportedKind {
                kind: op.op_kind()?,
                action: "manual approval",
            });
        }

        let deadline = chrono::Utc::now()
            + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::hours(4));
        match operations::set_confirmation_required(&self.pool, id, deadline).await? {
            Some(op) => {
                tracing::info!(operation = %id, %deadline, "Operation parked for manual approval");
                Ok(op)
            }
            None => Err(CoreError::InvalidStateTransition {
                from: op.op_state()?,
                to: OperationState::ConfirmationRequired,
            }),
        }
    }

    /// 确认通过，操作回到队列
    pub async fn approve(&self, id: Uuid) -> Result<CryptoOperation> {
        match operations::set_waiting_after_approval(&self.pool, id).await? {
            Some(op) => {
                tracing::info!(operation = %id, "Manual approval granted");
                Ok(op)
            }
            None => {
                let op = self.pipeline.get(id).await?;
                Err(CoreError::InvalidStateTransition {
                    from: op.op_state()?,
                    to: OperationState::Waiting,
                })
            }
        }
    }

    /// 确认被拒，取消并回退资金
    pub async fn deny(&self, id: Uuid) -> Result<CryptoOperation> {
        self.pipeline
            .mark_cancelled(id, Some("Manual confirmation cancelled"))
            .await
    }

    /// 清理过了期限的挂起操作，返回取消的条数
    pub async fn expire_overdue(&self) -> Result<usize> {
        let overdue = operations::list_confirmation_overdue(&self.pool, 100).await?;
        let mut cancelled = 0usize;

        for op in overdue {
            match self
                .pipeline
                .mark_cancelled(op.id, Some("Manual confirmation timed out"))
                .await
            {
                Ok(_) => cancelled += 1,
                Err(e) => {
                    tracing::error!(operation = %op.id, error = %e, "Timeout cancellation failed");
                }
            }
        }

        Ok(cancelled)
    }
}
