//! 核心错误类型定义
//!
//! 账务不变量的违反在事务内同步报错并回滚，不留半成品状态。
//! 外部网络动作的失败不走这里，而是落在单个操作的 failed 终态上。

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::operation::{OperationKind, OperationState};

#[derive(Debug, Error)]
pub enum CoreError {
    /// 余额不足，拒绝透支
    #[error("account {account_id} overdrawn: balance {balance}, requested {requested}")]
    AccountOverdrawn {
        account_id: Uuid,
        balance: Decimal,
        requested: Decimal,
    },

    /// 资产已冻结，禁止入账
    #[error("asset {asset_id} is frozen")]
    AssetFrozen { asset_id: Uuid },

    /// 跨资产转账
    #[error("transfer between incompatible assets: {from_asset} -> {to_asset}")]
    IncompatibleAssets { from_asset: Uuid, to_asset: Uuid },

    /// 资产与地址不在同一网络
    #[error("asset network {asset_network} does not match address network {address_network}")]
    WrongNetwork {
        asset_network: Uuid,
        address_network: Uuid,
    },

    /// 同一地址下同一资产只允许一个账户
    #[error("address {address_id} already holds an account for asset {asset_id}")]
    MultipleAssetAccountsPerAddress { address_id: Uuid, asset_id: Uuid },

    /// 同一地址只允许一个创建操作
    #[error("address {address_id} already has a creation operation")]
    MultipleCreationOperations { address_id: Uuid },

    /// 同一资产的代币合约只允许创建一次
    #[error("token for asset {asset_id} has already been created")]
    TokenAlreadyCreated { asset_id: Uuid },

    /// 每网络唯一约束冲突（symbol / name / external_id）
    #[error("duplicate asset: {constraint} already exists in network")]
    DuplicateAsset { constraint: &'static str },

    /// 状态机只能向前推进
    #[error("invalid operation state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: OperationState,
        to: OperationState,
    },

    /// 在缺少预期对手方状态的操作上调用回退，属于调用方错误
    #[error("operation {operation_id} ({kind}) cannot be reversed")]
    NotReversible {
        operation_id: Uuid,
        kind: OperationKind,
    },

    /// 操作缺少托管账户
    #[error("operation {operation_id} has no holding account")]
    MissingHoldingAccount { operation_id: Uuid },

    /// 账务流水没有对手方，无法原路退回
    #[error("transaction {transaction_id} has no counterparty to reverse into")]
    CounterpartyMissing { transaction_id: Uuid },

    /// 操作类型不支持该动作（如对存款挂人工审批）
    #[error("operation kind {kind} does not support {action}")]
    UnsupportedKind {
        kind: OperationKind,
        action: &'static str,
    },

    /// 金额必须为正
    #[error("amount must be positive: {amount}")]
    NonPositiveAmount { amount: Decimal },

    /// 定长二进制字段长度错误（地址 20 字节、txid 32 字节、opid 34 字节）
    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidByteLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// 无法解析的持久化枚举值
    #[error("unknown {what} value: {value}")]
    UnknownEnumValue { what: &'static str, value: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
