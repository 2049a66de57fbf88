//! 测试辅助模块
//! 提供测试连接池与种子数据；每个测试用自己独立的网络隔离数据
#![allow(dead_code)]

use rust_decimal::Decimal;
use uuid::Uuid;

use vaultcore::{
    domain::asset::AssetClass,
    infrastructure::{db::PgPool, migration},
    repository::{
        accounts::{self, Account},
        addresses::{self, CryptoAddress, CryptoAddressAccount},
        assets::{self, Asset, CreateAssetInput},
        networks::{self, AssetNetwork},
    },
    service::Ledger,
};

/// 测试数据库 URL
pub fn test_database_url() -> String {
    std::env::var("TEST_DATABASE_URL").unwrap_or_else(|_| {
        "postgres://root@localhost:26257/vaultcore_test?sslmode=disable".into()
    })
}

/// 创建测试数据库连接池并应用 schema
pub async fn create_test_pool() -> PgPool {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_database_url())
        .await
        .expect("Failed to create test database pool");

    migration::apply_migrations(&pool)
        .await
        .expect("Failed to apply migrations");

    pool
}

/// 每个测试一个独立网络，名称随机，避免唯一约束互相踩踏
pub async fn seed_network(pool: &PgPool) -> AssetNetwork {
    let name = format!("testnet-{}", Uuid::new_v4());
    networks::create(pool, &name, Some("Test Network"))
        .await
        .expect("Failed to seed network")
}

pub async fn seed_asset(pool: &PgPool, network_id: Uuid, symbol: &str) -> Asset {
    assets::create(
        pool,
        CreateAssetInput {
            network_id,
            name: format!("{symbol} test asset"),
            symbol: Some(symbol.to_string()),
            description: None,
            supply: Decimal::ZERO,
            asset_class: AssetClass::Token,
        },
    )
    .await
    .expect("Failed to seed asset")
}

/// 开账户并按需充值
pub async fn seed_account(pool: &PgPool, asset_id: Uuid, balance: i64) -> Account {
    let account = accounts::create(pool, asset_id)
        .await
        .expect("Failed to seed account");

    if balance != 0 {
        Ledger::new(pool.clone())
            .do_withdraw_or_deposit(
                account.id,
                Decimal::from(balance),
                Some("seed balance"),
                false,
            )
            .await
            .expect("Failed to seed balance");
    }

    accounts::get(pool, account.id)
        .await
        .expect("Failed to reload account")
        .expect("Seeded account vanished")
}

pub fn random_address_bytes() -> Vec<u8> {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut raw = a.as_bytes().to_vec();
    raw.extend_from_slice(&b.as_bytes()[..4]);
    raw
}

pub fn random_txid_bytes() -> Vec<u8> {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut raw = a.as_bytes().to_vec();
    raw.extend_from_slice(b.as_bytes());
    raw
}

/// 已经完成建址的托管地址
pub async fn seed_populated_address(pool: &PgPool, network_id: Uuid) -> CryptoAddress {
    let address = addresses::create(pool, network_id)
        .await
        .expect("Failed to seed address");
    addresses::set_address(pool, address.id, &random_address_bytes())
        .await
        .expect("Failed to populate address")
        .expect("Seeded address vanished")
}

/// 地址 + 资产账户 + 初始余额，提现类测试的起点
pub async fn seed_funded_crypto_account(
    pool: &PgPool,
    network_id: Uuid,
    asset_id: Uuid,
    balance: i64,
) -> (CryptoAddress, CryptoAddressAccount) {
    let address = seed_populated_address(pool, network_id).await;
    let manager = vaultcore::service::AddressManager::new(pool.clone(), 1);
    let crypto_account = manager
        .create_account(address.id, asset_id)
        .await
        .expect("Failed to create crypto account");

    if balance != 0 {
        Ledger::new(pool.clone())
            .do_withdraw_or_deposit(
                crypto_account.account_id,
                Decimal::from(balance),
                Some("seed balance"),
                false,
            )
            .await
            .expect("Failed to fund crypto account");
    }

    (address, crypto_account)
}
