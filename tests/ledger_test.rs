//! 账本核心不变量测试
//!
//! 运行方式：
//! ```bash
//! TEST_DATABASE_URL=... cargo test --test ledger_test -- --ignored
//! ```

mod common;

use rust_decimal::Decimal;

use vaultcore::{
    repository::accounts,
    service::{Ledger, ReconciliationService},
    CoreError,
};

#[tokio::test]
#[ignore]
async fn top_up_creates_single_transaction() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "USD").await;
    let account = common::seed_account(&pool, asset.id, 0).await;
    let ledger = Ledger::new(pool.clone());

    let tx = ledger
        .do_withdraw_or_deposit(account.id, Decimal::from(100), Some("top up"), false)
        .await
        .unwrap();

    assert_eq!(tx.amount, Decimal::from(100));
    assert_eq!(tx.message.as_deref(), Some("top up"));
    assert_eq!(
        ledger.get_balance(account.id).await.unwrap(),
        Decimal::from(100)
    );

    let txs = accounts::list_transactions(&pool, account.id, 10, 0)
        .await
        .unwrap();
    assert_eq!(txs.len(), 1);
}

#[tokio::test]
#[ignore]
async fn transfer_conserves_value_and_links_counterparties() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "USD").await;
    let a = common::seed_account(&pool, asset.id, 100).await;
    let b = common::seed_account(&pool, asset.id, 0).await;
    let ledger = Ledger::new(pool.clone());

    let before_total =
        ledger.get_balance(a.id).await.unwrap() + ledger.get_balance(b.id).await.unwrap();

    let (withdraw, deposit) = ledger
        .transfer(Decimal::from(30), a.id, b.id, Some("rent"))
        .await
        .unwrap();

    assert_eq!(ledger.get_balance(a.id).await.unwrap(), Decimal::from(70));
    assert_eq!(ledger.get_balance(b.id).await.unwrap(), Decimal::from(30));

    // 总量守恒
    let after_total =
        ledger.get_balance(a.id).await.unwrap() + ledger.get_balance(b.id).await.unwrap();
    assert_eq!(before_total, after_total);

    // 两条流水互为对手方
    assert_eq!(withdraw.amount, Decimal::from(-30));
    assert_eq!(deposit.amount, Decimal::from(30));
    let withdraw = accounts::get_transaction(&pool, withdraw.id)
        .await
        .unwrap()
        .unwrap();
    let deposit = accounts::get_transaction(&pool, deposit.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(withdraw.counterparty_id, Some(deposit.id));
    assert_eq!(deposit.counterparty_id, Some(withdraw.id));
}

#[tokio::test]
#[ignore]
async fn overdraw_is_rejected_and_leaves_state_unchanged() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "USD").await;
    let account = common::seed_account(&pool, asset.id, 30).await;
    let ledger = Ledger::new(pool.clone());

    let err = ledger
        .do_withdraw_or_deposit(account.id, Decimal::from(-50), Some("too much"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AccountOverdrawn { .. }));

    assert_eq!(ledger.get_balance(account.id).await.unwrap(), Decimal::from(30));
    let txs = accounts::list_transactions(&pool, account.id, 10, 0)
        .await
        .unwrap();
    assert_eq!(txs.len(), 1); // 只有种子充值那一条
}

#[tokio::test]
#[ignore]
async fn escrow_debit_may_go_negative_when_opted_in() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "USD").await;
    let account = common::seed_account(&pool, asset.id, 10).await;
    let ledger = Ledger::new(pool.clone());

    ledger
        .do_withdraw_or_deposit(account.id, Decimal::from(-25), Some("internal"), true)
        .await
        .unwrap();
    assert_eq!(
        ledger.get_balance(account.id).await.unwrap(),
        Decimal::from(-15)
    );
}

#[tokio::test]
#[ignore]
async fn frozen_asset_blocks_deposits_but_not_withdrawals() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "FRZ").await;
    let account = common::seed_account(&pool, asset.id, 50).await;
    let ledger = Ledger::new(pool.clone());
    let registry = vaultcore::service::AssetRegistry::new(pool.clone());

    registry.freeze_asset(asset.id).await.unwrap();

    let err = ledger
        .do_withdraw_or_deposit(account.id, Decimal::from(10), Some("deposit"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AssetFrozen { .. }));
    assert_eq!(ledger.get_balance(account.id).await.unwrap(), Decimal::from(50));

    // 出账不在冻结闸门之内
    ledger
        .do_withdraw_or_deposit(account.id, Decimal::from(-10), Some("withdraw"), false)
        .await
        .unwrap();
    assert_eq!(ledger.get_balance(account.id).await.unwrap(), Decimal::from(40));
}

#[tokio::test]
#[ignore]
async fn frozen_asset_blocks_transfers_entirely() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "FRZ").await;
    let a = common::seed_account(&pool, asset.id, 50).await;
    let b = common::seed_account(&pool, asset.id, 0).await;
    let ledger = Ledger::new(pool.clone());
    let registry = vaultcore::service::AssetRegistry::new(pool.clone());

    registry.freeze_asset(asset.id).await.unwrap();

    let err = ledger
        .transfer(Decimal::from(10), a.id, b.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AssetFrozen { .. }));
    assert_eq!(ledger.get_balance(a.id).await.unwrap(), Decimal::from(50));
    assert_eq!(ledger.get_balance(b.id).await.unwrap(), Decimal::ZERO);
}

#[tokio::test]
#[ignore]
async fn cross_asset_transfer_writes_nothing() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let usd = common::seed_asset(&pool, network.id, "USD").await;
    let eur = common::seed_asset(&pool, network.id, "EUR").await;
    let a = common::seed_account(&pool, usd.id, 100).await;
    let b = common::seed_account(&pool, eur.id, 0).await;
    let ledger = Ledger::new(pool.clone());

    let err = ledger
        .transfer(Decimal::from(30), a.id, b.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::IncompatibleAssets { .. }));

    assert_eq!(ledger.get_balance(a.id).await.unwrap(), Decimal::from(100));
    assert_eq!(ledger.get_balance(b.id).await.unwrap(), Decimal::ZERO);
    let txs_a = accounts::list_transactions(&pool, a.id, 10, 0).await.unwrap();
    let txs_b = accounts::list_transactions(&pool, b.id, 10, 0).await.unwrap();
    assert_eq!(txs_a.len(), 1);
    assert!(txs_b.is_empty());
}

#[tokio::test]
#[ignore]
async fn reversal_restores_both_balances() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "USD").await;
    let a = common::seed_account(&pool, asset.id, 100).await;
    let b = common::seed_account(&pool, asset.id, 0).await;
    let ledger = Ledger::new(pool.clone());

    let (withdraw, _) = ledger
        .transfer(Decimal::from(40), a.id, b.id, Some("out"))
        .await
        .unwrap();
    ledger.reverse(withdraw.id).await.unwrap();

    assert_eq!(ledger.get_balance(a.id).await.unwrap(), Decimal::from(100));
    assert_eq!(ledger.get_balance(b.id).await.unwrap(), Decimal::ZERO);
}

#[tokio::test]
#[ignore]
async fn concurrent_debits_never_overdraw() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "USD").await;
    let source = common::seed_account(&pool, asset.id, 100).await;
    let sink_a = common::seed_account(&pool, asset.id, 0).await;
    let sink_b = common::seed_account(&pool, asset.id, 0).await;
    let ledger = Ledger::new(pool.clone());

    // 两笔各 60 的并发扣款，最多一笔能成
    let first = ledger.transfer(Decimal::from(60), source.id, sink_a.id, None);
    let second = ledger.transfer(Decimal::from(60), source.id, sink_b.id, None);
    let (first, second) = tokio::join!(first, second);

    let succeeded = [first.is_ok(), second.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(succeeded, 1);

    let balance = ledger.get_balance(source.id).await.unwrap();
    assert_eq!(balance, Decimal::from(40));
    assert!(balance >= Decimal::ZERO);
}

#[tokio::test]
#[ignore]
async fn audit_finds_no_drift_after_mixed_traffic() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "USD").await;
    let a = common::seed_account(&pool, asset.id, 100).await;
    let b = common::seed_account(&pool, asset.id, 20).await;
    let ledger = Ledger::new(pool.clone());

    ledger
        .transfer(Decimal::from(15), a.id, b.id, None)
        .await
        .unwrap();
    ledger
        .do_withdraw_or_deposit(b.id, Decimal::from(-5), None, false)
        .await
        .unwrap();

    for account_id in [a.id, b.id] {
        let cached = ledger.get_balance(account_id).await.unwrap();
        let computed = accounts::sum_transactions(&pool, account_id).await.unwrap();
        assert_eq!(cached, computed);
    }
}

#[tokio::test]
#[ignore]
async fn repair_fixes_corrupted_cache() {
    let pool = common::create_test_pool().await;
    let network = common::seed_network(&pool).await;
    let asset = common::seed_asset(&pool, network.id, "USD").await;
    let account = common::seed_account(&pool, asset.id, 100).await;

    // 人为弄脏缓存
    sqlx::query("UPDATE account SET denormalized_balance = 999 WHERE id = $1")
        .bind(account.id)
        .execute(&pool)
        .await
        .unwrap();

    let service = ReconciliationService::new(pool.clone());
    let repaired = service.repair_balance(account.id).await.unwrap();
    assert_eq!(repaired, Decimal::from(100));

    let ledger = Ledger::new(pool.clone());
    assert_eq!(ledger.get_balance(account.id).await.unwrap(), Decimal::from(100));
}
