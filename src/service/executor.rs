//! 执行器契约与派发循环
//!
//! 真正的网络调用（RPC、合约交互）由外部执行器实现，核心只定义契约：
//! 按操作类型查静态注册表拿处理器，认领后调用。认领是 waiting -> pending
//! 的数据库 CAS，多个执行器并发轮询时，每个操作至多一个外部副作用。
//!
//! 处理器在完成外部动作后必须且只能走以下一条路径：
//! - mark_performed + mark_complete：动作完成且无需等待
//! - mark_performed：动作已发出，结局等确认数推进
//! - mark_failed(reason)：动作失败
//!
//! 处理器返回错误时由派发循环代为 mark_failed，单个操作的失败
//! 不会中断其余操作的处理。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    domain::operation::OperationKind,
    error::Result,
    infrastructure::db::PgPool,
    repository::operations::{self, CryptoOperation},
    service::pipeline::OperationPipeline,
};

/// 操作处理器：一种操作类型对应一个实现
#[async_trait]
pub trait OperationPerformer: Send + Sync {
    async fn perform(&self, pipeline: &OperationPipeline, op: &CryptoOperation) -> Result<()>;
}

/// 处理器注册表
///
/// 启动时静态构造一次，之后只读。类型到处理器是纯映射，没有运行时反射。
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    handlers: HashMap<OperationKind, Arc<dyn OperationPerformer>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        kind: OperationKind,
        handler: Arc<dyn OperationPerformer>,
    ) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn get(&self, kind: OperationKind) -> Option<Arc<dyn OperationPerformer>> {
        self.handlers.get(&kind).cloned()
    }
}

pub struct OperationExecutor {
    pool: PgPool,
    pipeline: OperationPipeline,
    registry: ExecutorRegistry,
    claim_batch_size: i64,
}

impl OperationExecutor {
    pub fn new(pool: PgPool, registry: ExecutorRegistry, claim_batch_size: i64) -> Self {
        let pipeline = OperationPipeline::new(pool.clone());
        Self {
            pool,
            pipeline,
            registry,
            claim_batch_size,
        }
    }

    pub fn pipeline(&self) -> &OperationPipeline {
        &self.pipeline
    }

    /// 跑一批等待中的操作
    ///
    /// 返回 (成功数, 失败数)。
    pub async fn run_waiting_operations(&self, network_id: Uuid) -> Result<(usize, usize)> {
        let ids =
            operations::list_waiting_ids(&self.pool, network_id, self.claim_batch_size).await?;

        let mut success_count = 0usize;
        let mut failure_count = 0usize;

        for id in ids {
            match self.run_one(id).await {
                Ok(true) => success_count += 1,
                Ok(false) => {} // 被别的执行器抢走
                Err(e) => {
                    failure_count += 1;
                    tracing::error!(operation = %id, error = %e, "Crypto operation failure");
                }
            }
        }

        Ok((success_count, failure_count))
    }

    async fn run_one(&self, id: Uuid) -> Result<bool> {
        // 认领：赢不到 CAS 说明另一个执行器已经拿走，跳过即可
        let Some(op) = operations::claim(&self.pool, id).await? else {
            return Ok(false);
        };

        let kind = op.op_kind()?;
        let Some(handler) = self.registry.get(kind) else {
            self.pipeline
                .mark_failed(id, Some(&format!("no performer registered for {kind}")))
                .await?;
            tracing::error!(operation = %id, %kind, "No performer registered");
            return Ok(false);
        };

        tracing::info!(operation = %id, %kind, attempts = op.attempts, "Running operation");

        if let Err(e) = handler.perform(&self.pipeline, &op).await {
            // 处理器报错：失败落在这一个操作上，不向外传播
            let reason = e.to_string();
            if let Err(mark_err) = self.pipeline.mark_failed(id, Some(&reason)).await {
                tracing::error!(
                    operation = %id,
                    error = %mark_err,
                    "Failed to record operation failure"
                );
            }
            return Err(e);
        }

        Ok(true)
    }
}
