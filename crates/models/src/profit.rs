use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::mul_div;

/// 默认捐献比例 (净利润的 30%)
pub const DEFAULT_TITHE_PERCENT: u32 = 30;

/// 利润分配结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfitSplit {
    pub gross_profit: U256,
    pub fee_paid: U256,
    pub net_profit: U256,
    pub tithe_amount: U256,
    pub operator_amount: U256,
}

impl ProfitSplit {
    /// 按结算时余额计算分配
    ///
    /// - gross = max(0, balance - borrowed)
    /// - net = max(0, balance - (borrowed + fee))
    /// - tithe = floor(net * tithe_percent / 100)，operator 吸收取整误差
    pub fn compute(balance: U256, borrowed: U256, fee: U256, tithe_percent: u32) -> Self {
        let total_repay = borrowed.saturating_add(fee);
        let gross_profit = balance.saturating_sub(borrowed);
        let net_profit = balance.saturating_sub(total_repay);
        let (tithe_amount, operator_amount) = split_net(net_profit, tithe_percent);

        Self {
            gross_profit,
            fee_paid: fee,
            net_profit,
            tithe_amount,
            operator_amount,
        }
    }

    /// 是否需要执行分配 (net == 0 时跳过，属于正常结果)
    pub fn has_profit(&self) -> bool {
        !self.net_profit.is_zero()
    }
}

/// 按比例拆分净利润，返回 (tithe, operator)
pub fn split_net(net_profit: U256, tithe_percent: u32) -> (U256, U256) {
    if net_profit.is_zero() {
        return (U256::zero(), U256::zero());
    }
    let percent = tithe_percent.min(100);
    let tithe = mul_div(net_profit, U256::from(percent), U256::from(100u64)).unwrap_or_default();
    (tithe, net_profit - tithe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_thousand() {
        let split = ProfitSplit::compute(U256::from(11_005u64), U256::from(10_000u64), U256::from(5u64), 30);
        assert_eq!(split.gross_profit, U256::from(1_005u64));
        assert_eq!(split.net_profit, U256::from(1_000u64));
        assert_eq!(split.tithe_amount, U256::from(300u64));
        assert_eq!(split.operator_amount, U256::from(700u64));
    }

    #[test]
    fn test_split_rounding_goes_to_operator() {
        let (tithe, operator) = split_net(U256::one(), 30);
        assert_eq!(tithe, U256::zero());
        assert_eq!(operator, U256::one());
    }

    #[test]
    fn test_no_profit_skips_split() {
        let split = ProfitSplit::compute(U256::from(10_005u64), U256::from(10_000u64), U256::from(5u64), 30);
        assert!(!split.has_profit());
        assert_eq!(split.gross_profit, U256::from(5u64));
        assert_eq!(split.tithe_amount, U256::zero());
        assert_eq!(split.operator_amount, U256::zero());
    }

    #[test]
    fn test_split_sum_invariant() {
        for net in [1u64, 2, 3, 7, 99, 101, 333, 1_000_001] {
            let (tithe, operator) = split_net(U256::from(net), 30);
            assert_eq!(tithe + operator, U256::from(net));
            assert_eq!(tithe, U256::from(net * 30 / 100));
        }
    }
}
