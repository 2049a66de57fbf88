pub mod accounts;
pub mod addresses;
pub mod assets;
pub mod networks;
pub mod operations;

pub use accounts::{Account, AccountTransaction};
pub use addresses::{CryptoAddress, CryptoAddressAccount};
pub use assets::Asset;
pub use networks::{AssetNetwork, NetworkStatus};
pub use operations::CryptoOperation;

use crate::error::CoreError;

/// Postgres unique violation (23505) mapped to the typed duplicate error.
pub(crate) fn map_unique_violation(e: sqlx::Error, constraint: &'static str) -> CoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            CoreError::DuplicateAsset { constraint }
        }
        _ => CoreError::Database(e),
    }
}
