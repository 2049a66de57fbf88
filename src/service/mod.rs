pub mod address_manager;
pub mod approval; // ✅ 人工审批闸门：通过 / 拒绝 / 超时
pub mod asset_registry;
pub mod confirmation_tracker;
pub mod executor;
pub mod ledger;
pub mod pipeline;
pub mod reconciliation; // ✅ 余额缓存全量重算核对

pub use address_manager::AddressManager;
pub use approval::ApprovalGate;
pub use asset_registry::AssetRegistry;
pub use confirmation_tracker::ConfirmationTracker;
pub use executor::{ExecutorRegistry, OperationExecutor, OperationPerformer};
pub use ledger::Ledger;
pub use pipeline::{OperationPipeline, TokenHolding, TokenImportInfo};
pub use reconciliation::ReconciliationService;
