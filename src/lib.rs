//! vaultcore - 托管钱包账务核心
//!
//! 双式记账账本 + 链上操作异步管道。核心自身不做网络 I/O，
//! 只定义状态、不变量和外部执行器/确认轮询方必须遵守的转换契约。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod repository;
pub mod service;

// 重新导出常用类型
pub use error::{CoreError, Result};

pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{AssetClass, AssetState, OperationKind, OperationState},
        error::{CoreError, Result},
        service::{
            AddressManager, ApprovalGate, AssetRegistry, ConfirmationTracker, ExecutorRegistry,
            Ledger, OperationExecutor, OperationPerformer, OperationPipeline,
        },
    };
}
