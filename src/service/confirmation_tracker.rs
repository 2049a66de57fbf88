//! 确认数跟踪
//!
//! 核心只做纯算术：网络最新区块高度 - 操作所在区块 = 确认深度。
//! 轮询由外部进程驱动，它喂进新的区块高度，这里逐个推进在途操作。
//! 对已完成操作的重复推进是无害的空操作。

use uuid::Uuid;

use crate::{
    error::Result,
    infrastructure::db::PgPool,
    repository::{
        networks::{self, NetworkStatus},
        operations::{self, CryptoOperation},
    },
    service::pipeline::OperationPipeline,
};

const SWEEP_BATCH_SIZE: i64 = 200;

/// 纯函数：由 (最新区块, 操作区块, txid 有无, 是否跟踪确认) 推出确认深度
///
/// - 不跟踪确认的操作（如建址完成后）返回 None
/// - 网络高度未知返回 None
/// - 还没有 txid 或还没被打包进区块时返回 0
pub fn confirmation_depth(
    latest_block: Option<i64>,
    operation_block: Option<i64>,
    has_txid: bool,
    tracks_confirmations: bool,
) -> Option<i64> {
    if !tracks_confirmations {
        return None;
    }
    let latest = latest_block?;
    if !has_txid {
        // 还没进 mempool
        return Some(0);
    }
    let Some(block) = operation_block else {
        // 还没被挖出
        return Some(0);
    };
    Some(latest - block)
}

#[derive(Clone)]
pub struct ConfirmationTracker {
    pool: PgPool,
    pipeline: OperationPipeline,
}

impl ConfirmationTracker {
    pub fn new(pool: PgPool) -> Self {
        let pipeline = OperationPipeline::new(pool.clone());
        Self { pool, pipeline }
    }

    /// 外部轮询喂进新的网络区块高度
    pub async fn record_network_block(
        &self,
        network_id: Uuid,
        latest_block: i64,
    ) -> Result<NetworkStatus> {
        let status = networks::upsert_latest_block(&self.pool, network_id, latest_block).await?;
        tracing::debug!(network = %network_id, latest_block, "Network heartbeat recorded");
        Ok(status)
    }

    /// 计算单个操作当前的确认深度
    pub async fn calculate_confirmations(&self, op: &CryptoOperation) -> Result<Option<i64>> {
        if !op.tracks_confirmations() {
            return Ok(None);
        }
        let status = networks::get_status(&self.pool, op.network_id).await?;
        let latest_block = status.and_then(|s| s.latest_block);
        Ok(confirmation_depth(
            latest_block,
            op.block,
            op.txid.is_some(),
            true,
        ))
    }

    /// 扫一遍该网络所有未定稿的跟踪确认操作
    ///
    /// 返回 (本轮定稿数, 内部失败数)。单个操作的失败只记日志，
    /// 不会打断其余操作的推进。
    pub async fn poll_network(&self, network_id: Uuid) -> Result<(usize, usize)> {
        let ops =
            operations::list_unresolved_tracked(&self.pool, network_id, SWEEP_BATCH_SIZE).await?;

        let mut resolved = 0usize;
        let mut failures = 0usize;

        for op in ops {
            match self.advance(&op).await {
                Ok(true) => resolved += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(operation = %op.id, error = %e, "Confirmation update failed");
                    failures += 1;
                }
            }
        }

        Ok((resolved, failures))
    }

    async fn advance(&self, op: &CryptoOperation) -> Result<bool> {
        let Some(depth) = self.calculate_confirmations(op).await? else {
            return Ok(false);
        };
        self.pipeline.update_confirmations(op.id, depth).await
    }
}

#[cfg(test)]
mod tests {
    use super::confirmation_depth;

    #[test]
    fn untracked_operations_have_no_depth() {
        assert_eq!(confirmation_depth(Some(100), Some(90), true, false), None);
    }

    #[test]
    fn unknown_network_height_gives_none() {
        assert_eq!(confirmation_depth(None, Some(90), true, true), None);
    }

    #[test]
    fn not_yet_in_mempool_is_zero() {
        assert_eq!(confirmation_depth(Some(100), None, false, true), Some(0));
    }

    #[test]
    fn mined_but_block_unknown_is_zero() {
        assert_eq!(confirmation_depth(Some(100), None, true, true), Some(0));
    }

    #[test]
    fn depth_is_height_difference() {
        assert_eq!(confirmation_depth(Some(100), Some(96), true, true), Some(4));
        assert_eq!(confirmation_depth(Some(96), Some(96), true, true), Some(0));
    }
}
