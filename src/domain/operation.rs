//! 链上操作统一状态机
//!
//! 所有操作类型（建址、存款、提现、发币、导入）共用同一状态机。
//! 状态只能向前推进；取消是唯一带补偿动作（资金回退）的转换。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// 操作类型：封闭枚举，按 kind 分派行为，不走运行时反射
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// 创建接收地址（托管钱包合约）
    CreateAddress,
    /// 外部转入，经托管账户确认后入账
    Deposit,
    /// 提现到外部地址，资金先锁入托管账户
    Withdraw,
    /// 代币合约创建，初始供应量经托管账户入账
    CreateToken,
    /// 导入已存在的代币合约并扫描余额
    ImportToken,
}

/// 每种操作类型的能力表
///
/// resolve / reverse 的分派依据。静态构造，启动后不再变化。
#[derive(Debug, Clone, Copy)]
pub struct OperationCaps {
    /// 是否搬动资金（即是否持有托管账户）
    pub moves_value: bool,
    /// resolve 时是否把托管账户结算进目标账户
    pub settles_holding_on_resolve: bool,
    /// 广播前取消时是否有资金可回退
    pub reversible: bool,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateAddress => "create_address",
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::CreateToken => "create_token",
            Self::ImportToken => "import_token",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "create_address" => Ok(Self::CreateAddress),
            "deposit" => Ok(Self::Deposit),
            "withdraw" => Ok(Self::Withdraw),
            "create_token" => Ok(Self::CreateToken),
            "import_token" => Ok(Self::ImportToken),
            other => Err(CoreError::UnknownEnumValue {
                what: "operation kind",
                value: other.to_string(),
            }),
        }
    }

    /// 查能力表
    pub fn caps(&self) -> OperationCaps {
        match self {
            // 建址不搬资金，取消等于放弃，无需回退
            Self::CreateAddress => OperationCaps {
                moves_value: false,
                settles_holding_on_resolve: false,
                reversible: true,
            },
            // 存款与发币：确认达标后托管账户结算进真实账户
            Self::Deposit | Self::CreateToken => OperationCaps {
                moves_value: true,
                settles_holding_on_resolve: true,
                reversible: false,
            },
            // 提现：广播前可整体回退托管资金
            Self::Withdraw => OperationCaps {
                moves_value: true,
                settles_holding_on_resolve: false,
                reversible: true,
            },
            // 导入直接给账户播种余额，中途失败容忍半成品
            Self::ImportToken => OperationCaps {
                moves_value: false,
                settles_holding_on_resolve: false,
                reversible: false,
            },
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 操作状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// 需要带外人工审批（短信等）后才能进入队列
    ConfirmationRequired,
    /// 已入库，等待服务进程拾取
    Waiting,
    /// 已被执行器认领并尝试本地/初始广播步骤，不会被二次认领
    Pending,
    /// 已观察到交易在网络上传播，等待确认数
    Broadcasted,
    /// 确认数达标或无需确认，终态
    Success,
    /// 失败，终态。广播后失败不自动回退资金
    Failed,
    /// 广播前取消，资金已自动回退，终态
    Cancelled,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfirmationRequired => "confirmation_required",
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Broadcasted => "broadcasted",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "confirmation_required" => Ok(Self::ConfirmationRequired),
            "waiting" => Ok(Self::Waiting),
            "pending" => Ok(Self::Pending),
            "broadcasted" => Ok(Self::Broadcasted),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::UnknownEnumValue {
                what: "operation state",
                value: other.to_string(),
            }),
        }
    }

    /// 是否为终态（不可再转换）
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// 是否仍在管道中流转
    pub fn is_in_progress(&self) -> bool {
        !self.is_final()
    }

    /// 广播前状态：取消与自动回退只在这个窗口内被接受
    pub fn is_pre_broadcast(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationRequired | Self::Waiting | Self::Pending
        )
    }

    /// 验证状态转换合法性
    pub fn can_transition_to(&self, target: Self) -> bool {
        use OperationState::*;

        if self.is_final() {
            return false;
        }

        match (self, target) {
            // 人工审批闸门：通过回到队列，拒绝/超时走取消
            (Waiting, ConfirmationRequired) => true,
            (ConfirmationRequired, Waiting) => true,

            // 执行器推进
            (Waiting, Pending) => true,
            (Pending, Broadcasted) => true,

            // 任何非终态都可以直接完成（无需确认或确认数已达标）
            (_, Success) => true,

            // 失败：广播前的本地失败，或广播后链上失败
            (_, Failed) => true,

            // 取消只在广播前接受
            (s, Cancelled) => s.is_pre_broadcast(),

            _ => false,
        }
    }

    /// 转换校验，非法转换返回错误
    pub fn ensure_transition(&self, target: Self) -> Result<()> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(CoreError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trip() {
        for kind in [
            OperationKind::CreateAddress,
            OperationKind::Deposit,
            OperationKind::Withdraw,
            OperationKind::CreateToken,
            OperationKind::ImportToken,
        ] {
            assert_eq!(OperationKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(OperationKind::parse("swap").is_err());
    }

    #[test]
    fn state_round_trip() {
        for state in [
            OperationState::ConfirmationRequired,
            OperationState::Waiting,
            OperationState::Pending,
            OperationState::Broadcasted,
            OperationState::Success,
            OperationState::Failed,
            OperationState::Cancelled,
        ] {
            assert_eq!(OperationState::parse(state.as_str()).unwrap(), state);
        }
    }

    #[test]
    fn forward_transitions() {
        use OperationState::*;
        assert!(Waiting.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Broadcasted));
        assert!(Broadcasted.can_transition_to(Success));
        assert!(Waiting.can_transition_to(Success));
        assert!(Waiting.can_transition_to(ConfirmationRequired));
        assert!(ConfirmationRequired.can_transition_to(Waiting));
    }

    #[test]
    fn cancellation_window_closes_after_broadcast() {
        use OperationState::*;
        assert!(Waiting.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(ConfirmationRequired.can_transition_to(Cancelled));
        // 广播后只能失败，不能取消
        assert!(!Broadcasted.can_transition_to(Cancelled));
        assert!(Broadcasted.can_transition_to(Failed));
    }

    #[test]
    fn final_states_are_sticky() {
        use OperationState::*;
        for terminal in [Success, Failed, Cancelled] {
            assert!(terminal.is_final());
            for target in [
                ConfirmationRequired,
                Waiting,
                Pending,
                Broadcasted,
                Success,
                Failed,
                Cancelled,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn no_backwards_movement() {
        use OperationState::*;
        assert!(!Pending.can_transition_to(Waiting));
        assert!(!Broadcasted.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(ConfirmationRequired));
    }

    #[test]
    fn caps_table() {
        assert!(!OperationKind::CreateAddress.caps().moves_value);
        assert!(OperationKind::Deposit.caps().settles_holding_on_resolve);
        assert!(OperationKind::CreateToken.caps().settles_holding_on_resolve);
        assert!(OperationKind::Withdraw.caps().reversible);
        assert!(!OperationKind::Withdraw.caps().settles_holding_on_resolve);
        assert!(!OperationKind::ImportToken.caps().reversible);
    }
}
