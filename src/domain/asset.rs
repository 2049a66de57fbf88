//! 资产分类与可见性状态
//!
//! 资产目录按网络隔离，symbol / name / 合约地址在网络内唯一。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// 资产类别，决定展示格式与行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// 法币，0,00
    Fiat,
    /// 加密货币
    Cryptocurrency,
    /// 合约代币
    Token,
    /// 代币化股份
    TokenizedShares,
    /// 以太，最多 18 位小数
    Ether,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fiat => "fiat",
            Self::Cryptocurrency => "cryptocurrency",
            Self::Token => "token",
            Self::TokenizedShares => "tokenized_shares",
            Self::Ether => "ether",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "fiat" => Ok(Self::Fiat),
            "cryptocurrency" => Ok(Self::Cryptocurrency),
            "token" => Ok(Self::Token),
            "tokenized_shares" => Ok(Self::TokenizedShares),
            "ether" => Ok(Self::Ether),
            other => Err(CoreError::UnknownEnumValue {
                what: "asset class",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 资产在系统内的全局可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    /// 资产信息与持有情况公开
    Public,
    /// 仅持有者可见
    Shared,
    /// 仅资产所有者可见
    Owner,
    /// 冻结：禁止一切入账
    Frozen,
}

impl AssetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Shared => "shared",
            Self::Owner => "owner",
            Self::Frozen => "frozen",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Self::Public),
            "shared" => Ok(Self::Shared),
            "owner" => Ok(Self::Owner),
            "frozen" => Ok(Self::Frozen),
            other => Err(CoreError::UnknownEnumValue {
                what: "asset state",
                value: other.to_string(),
            }),
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, Self::Frozen)
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_round_trip() {
        for class in [
            AssetClass::Fiat,
            AssetClass::Cryptocurrency,
            AssetClass::Token,
            AssetClass::TokenizedShares,
            AssetClass::Ether,
        ] {
            assert_eq!(AssetClass::parse(class.as_str()).unwrap(), class);
        }
    }

    #[test]
    fn state_round_trip() {
        for state in [
            AssetState::Public,
            AssetState::Shared,
            AssetState::Owner,
            AssetState::Frozen,
        ] {
            assert_eq!(AssetState::parse(state.as_str()).unwrap(), state);
        }
        assert!(AssetState::Frozen.is_frozen());
        assert!(!AssetState::Public.is_frozen());
    }
}
