//! 确认数推进与执行器派发测试
//!
//! 运行方式：
//! ```bash
//! TEST_DATABASE_URL=... cargo test --test confirmations_test -- --ignored
//! ```

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use vaultcore::{
    domain::operation::{OperationKind, OperationState},
    repository::operations::CryptoOperation,
    service::{
        AddressManager, ConfirmationTracker, ExecutorRegistry, OperationExecutor,
        OperationPerformer, OperationPipeline,
    },
    Result,
};

#[tokio::test]
#[ignore]
async fn confirmations_resolve_only_past_required_depth() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "TOK").await;
    let (_, crypto_account) =
        common::seed_funded_crypto_account(&pool, network.id, asset.id, 50).await;

    let manager = AddressManager::new(pool.clone(), 1);
    let pipeline = OperationPipeline::new(pool.clone());
    let tracker = ConfirmationTracker::new(pool.clone());

    let op = manager
        .withdraw(
            crypto_account.id,
            Decimal::from(5),
            &common::random_address_bytes(),
            None,
            Some(3),
        )
        .await
        .unwrap();

    // 广播并落块
    pipeline.mark_performed(op.id).await.unwrap();
    pipeline
        .attach_transaction(op.id, &common::random_txid_bytes(), Some(100))
        .await
        .unwrap();

    // 两个确认：不够
    tracker.record_network_block(network.id, 102).await.unwrap();
    let (resolved, failures) = tracker.poll_network(network.id).await.unwrap();
    assert_eq!((resolved, failures), (0, 0));
    let op_row = pipeline.get(op.id).await.unwrap();
    assert!(op_row.completed_at.is_none());

    // 五个确认：超过要求的三个，定稿
    tracker.record_network_block(network.id, 105).await.unwrap();
    let (resolved, _) = tracker.poll_network(network.id).await.unwrap();
    assert_eq!(resolved, 1);
    let op_row = pipeline.get(op.id).await.unwrap();
    assert_eq!(op_row.op_state().unwrap(), OperationState::Success);
    assert!(op_row.completed_at.is_some());
}

#[tokio::test]
#[ignore]
async fn confirmation_updates_are_idempotent_after_completion() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "TOK").await;
    let (_, crypto_account) =
        common::seed_funded_crypto_account(&pool, network.id, asset.id, 50).await;

    let manager = AddressManager::new(pool.clone(), 1);
    let pipeline = OperationPipeline::new(pool.clone());

    let op = manager
        .withdraw(
            crypto_account.id,
            Decimal::from(5),
            &common::random_address_bytes(),
            None,
            Some(3),
        )
        .await
        .unwrap();
    pipeline
        .attach_transaction(op.id, &common::random_txid_bytes(), Some(100))
        .await
        .unwrap();

    assert!(pipeline.update_confirmations(op.id, 4).await.unwrap());
    let first = pipeline.get(op.id).await.unwrap();

    // 完成后的重复推进什么都不改
    assert!(!pipeline.update_confirmations(op.id, 4).await.unwrap());
    assert!(!pipeline.update_confirmations(op.id, 40).await.unwrap());
    let second = pipeline.get(op.id).await.unwrap();
    assert_eq!(first.completed_at, second.completed_at);
    assert_eq!(first.state, second.state);
}

#[tokio::test]
#[ignore]
async fn unmined_operations_count_zero_confirmations() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "TOK").await;
    let (_, crypto_account) =
        common::seed_funded_crypto_account(&pool, network.id, asset.id, 50).await;

    let manager = AddressManager::new(pool.clone(), 1);
    let tracker = ConfirmationTracker::new(pool.clone());

    let op = manager
        .withdraw(
            crypto_account.id,
            Decimal::from(5),
            &common::random_address_bytes(),
            None,
            Some(1),
        )
        .await
        .unwrap();

    // 网络高度未知
    let op_row = vaultcore::repository::operations::get(&pool, op.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tracker.calculate_confirmations(&op_row).await.unwrap(), None);

    // 已知高度但还没进 mempool
    tracker.record_network_block(network.id, 500).await.unwrap();
    assert_eq!(
        tracker.calculate_confirmations(&op_row).await.unwrap(),
        Some(0)
    );
}

struct RecordingPerformer;

#[async_trait]
impl OperationPerformer for RecordingPerformer {
    async fn perform(&self, pipeline: &OperationPipeline, op: &CryptoOperation) -> Result<()> {
        // 发出网络动作，结局留给确认数推进
        pipeline.mark_performed(op.id).await?;
        Ok(())
    }
}

struct FailingPerformer;

#[async_trait]
impl OperationPerformer for FailingPerformer {
    async fn perform(&self, _pipeline: &OperationPipeline, _op: &CryptoOperation) -> Result<()> {
        Err(vaultcore::CoreError::NonPositiveAmount {
            amount: Decimal::ZERO,
        })
    }
}

#[tokio::test]
#[ignore]
async fn executor_claims_and_dispatches_by_kind() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "TOK").await;
    let (_, crypto_account) =
        common::seed_funded_crypto_account(&pool, network.id, asset.id, 50).await;

    let manager = AddressManager::new(pool.clone(), 1);
    let op = manager
        .withdraw(
            crypto_account.id,
            Decimal::from(5),
            &common::random_address_bytes(),
            None,
            Some(1),
        )
        .await
        .unwrap();

    let registry =
        ExecutorRegistry::new().register(OperationKind::Withdraw, Arc::new(RecordingPerformer));
    let executor = OperationExecutor::new(pool.clone(), registry, 50);

    let (success, failure) = executor.run_waiting_operations(network.id).await.unwrap();
    assert_eq!((success, failure), (1, 0));

    let op = executor.pipeline().get(op.id).await.unwrap();
    assert_eq!(op.op_state().unwrap(), OperationState::Pending);
    assert_eq!(op.attempts, 1);

    // 没有重复认领
    let (success, failure) = executor.run_waiting_operations(network.id).await.unwrap();
    assert_eq!((success, failure), (0, 0));
}

#[tokio::test]
#[ignore]
async fn handler_failure_marks_operation_failed_without_halting_batch() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "TOK").await;
    let (_, crypto_account) =
        common::seed_funded_crypto_account(&pool, network.id, asset.id, 50).await;

    let manager = AddressManager::new(pool.clone(), 1);
    let bad = manager
        .withdraw(
            crypto_account.id,
            Decimal::from(5),
            &common::random_address_bytes(),
            None,
            Some(1),
        )
        .await
        .unwrap();
    let good = manager
        .import_token(network.id, &common::random_address_bytes())
        .await
        .unwrap();

    let registry = ExecutorRegistry::new()
        .register(OperationKind::Withdraw, Arc::new(FailingPerformer))
        .register(OperationKind::ImportToken, Arc::new(RecordingPerformer));
    let executor = OperationExecutor::new(pool.clone(), registry, 50);

    let (success, failure) = executor.run_waiting_operations(network.id).await.unwrap();
    assert_eq!((success, failure), (1, 1));

    let bad = executor.pipeline().get(bad.id).await.unwrap();
    assert_eq!(bad.op_state().unwrap(), OperationState::Failed);
    assert!(bad.error.is_some());

    let good = executor.pipeline().get(good.id).await.unwrap();
    assert_eq!(good.op_state().unwrap(), OperationState::Pending);
}

#[tokio::test]
#[ignore]
async fn missing_handler_fails_the_operation() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;

    let manager = AddressManager::new(pool.clone(), 1);
    let (_, op) = manager.create_address(network.id, None).await.unwrap();

    let executor = OperationExecutor::new(pool.clone(), ExecutorRegistry::new(), 50);
    let (success, _) = executor.run_waiting_operations(network.id).await.unwrap();
    assert_eq!(success, 0);

    let op = executor.pipeline().get(op.id).await.unwrap();
    assert_eq!(op.op_state().unwrap(), OperationState::Failed);
    assert!(op
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("no performer registered"));
}
