pub mod address;
pub mod asset;
pub mod operation;

pub use asset::{AssetClass, AssetState};
pub use operation::{OperationCaps, OperationKind, OperationState};
