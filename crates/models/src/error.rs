use ethers::types::{Address, U256};
use std::fmt;
use thiserror::Error;

use crate::DexType;

/// 回调校验错误 (在任何兑换之前中止)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("调用者 {actual:?} 不是记录的出借方 {expected:?}")]
    UnauthorizedCaller { expected: Option<Address>, actual: Address },

    #[error("池身份不匹配: 派生地址 {computed:?}, 调用者 {caller:?}")]
    PoolIdentityMismatch { computed: Address, caller: Address },

    #[error("发起者 {actual:?} 不是执行器自身 {expected:?}")]
    InvalidInitiator { expected: Address, actual: Address },

    #[error("仅支持单一资产闪电贷, 实际 {0} 个")]
    UnsupportedAssetCount(usize),

    #[error("手续费槽位不匹配: {0}")]
    FeeSlotMismatch(String),

    #[error("未知的路径形状标签: {0}")]
    UnknownPathShape(u8),

    #[error("回调数据格式错误: {0}")]
    MalformedPayload(String),

    #[error("无效路径: {0}")]
    InvalidPath(String),

    #[error("已有结算正在进行")]
    Reentrancy,
}

/// 链下报价失败的结构化上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationFailure {
    pub hop: usize,
    pub pool: Address,
    pub dex: DexType,
    pub amount_in: U256,
    pub fee: u32,
    pub reason: String,
}

impl fmt::Display for SimulationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "第 {} 跳报价失败 (pool={:?}, dex={}, amount_in={}, fee={}): {}",
            self.hop, self.pool, self.dex, self.amount_in, self.fee, self.reason
        )
    }
}

/// 套利错误分类
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArbitrageError {
    #[error("校验失败: {0}")]
    Validation(#[from] ValidationError),

    #[error("第 {hop} 跳兑换失败 ({dex}): {reason}")]
    SwapExecution { hop: usize, dex: DexType, reason: String },

    #[error("余额不足以还款: 需要 {required}, 持有 {available}")]
    InsufficientRepayment { required: U256, available: U256 },

    #[error("模拟失败: {0}")]
    Simulation(SimulationFailure),

    /// 结算过程中的运行时回滚 (出借方余额、分配转账等)，与静态配置无关
    #[error("结算回滚: {0}")]
    Settlement(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("提交失败: {0}")]
    Submission(String),
}

impl ArbitrageError {
    /// 只有链下模拟失败是可恢复的 (丢弃本周期机会，下周期不受影响)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ArbitrageError::Simulation(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ArbitrageError::Validation(_) => "ValidationError",
            ArbitrageError::SwapExecution { .. } => "SwapExecutionError",
            ArbitrageError::InsufficientRepayment { .. } => "InsufficientRepaymentError",
            ArbitrageError::Simulation(_) => "SimulationError",
            ArbitrageError::Settlement(_) => "SettlementError",
            ArbitrageError::Configuration(_) => "ConfigurationError",
            ArbitrageError::Submission(_) => "SubmissionError",
        }
    }
}

impl From<SimulationFailure> for ArbitrageError {
    fn from(failure: SimulationFailure) -> Self {
        ArbitrageError::Simulation(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_simulation_is_recoverable() {
        let sim = ArbitrageError::Simulation(SimulationFailure {
            hop: 0,
            pool: Address::zero(),
            dex: DexType::UniswapV3,
            amount_in: U256::one(),
            fee: 500,
            reason: "revert".to_string(),
        });
        assert!(sim.is_recoverable());
        assert!(!ArbitrageError::Configuration("missing".into()).is_recoverable());
        assert!(!ArbitrageError::from(ValidationError::Reentrancy).is_recoverable());
        assert!(sim.to_string().contains("fee=500"));
    }

    #[test]
    fn test_settlement_revert_kind() {
        let err = ArbitrageError::Settlement("闪电兑换池资金不足".into());
        assert_eq!(err.kind(), "SettlementError");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("资金不足"));
    }
}
