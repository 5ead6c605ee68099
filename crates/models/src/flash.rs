use ethers::types::{Address, Bytes, U256, U512};
use serde::{Deserialize, Serialize};

use crate::sort_tokens;

/// 费率基数 (1e6)
pub const FEE_DENOMINATOR: u64 = 1_000_000;

/// 闪电贷手续费: floor(amount * fee / 1_000_000)
///
/// 与出借方的记账方式逐位一致，模拟器、出借方、请求构造共用此函数
pub fn flash_fee(amount: U256, fee: u32) -> U256 {
    let wide = amount.full_mul(U256::from(fee)) / U512::from(FEE_DENOMINATOR);
    // fee < 1e6 时结果不超过 amount
    U256::try_from(wide).unwrap_or(U256::MAX)
}

/// 按比例计算 floor(value * numerator / denominator)，中间结果不溢出
pub fn mul_div(value: U256, numerator: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    let wide = value.full_mul(numerator) / U512::from(denominator);
    U256::try_from(wide).ok()
}

/// V3 池的身份键 (token0, token1, fee)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PoolKey {
    pub token0: Address,
    pub token1: Address,
    pub fee: u32,
}

impl PoolKey {
    pub fn new(token_a: Address, token_b: Address, fee: u32) -> Self {
        let (token0, token1) = sort_tokens(token_a, token_b);
        Self { token0, token1, fee }
    }

    pub fn is_empty(&self) -> bool {
        self.token0.is_zero() && self.token1.is_zero() && self.fee == 0
    }
}

/// 闪电贷资金来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashSource {
    /// 单资产场所自带的闪电兑换 (Uniswap V3 flash)
    FlashSwapPool { pool: Address, key: PoolKey },
    /// 通用借贷池 (Aave 风格 flashLoan，仅请求单一资产)
    LendingPool { pool: Address, premium: u32 },
}

impl FlashSource {
    /// 出借方地址，结算时用于回调身份比对
    pub fn lender(&self) -> Address {
        match self {
            FlashSource::FlashSwapPool { pool, .. } => *pool,
            FlashSource::LendingPool { pool, .. } => *pool,
        }
    }

    /// 费率 (1e6 基数)
    pub fn fee_rate(&self) -> u32 {
        match self {
            FlashSource::FlashSwapPool { key, .. } => key.fee,
            FlashSource::LendingPool { premium, .. } => *premium,
        }
    }

    pub fn is_flash_swap(&self) -> bool {
        matches!(self, FlashSource::FlashSwapPool { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlashSource::FlashSwapPool { .. } => "Uniswap V3 Flash",
            FlashSource::LendingPool { .. } => "Lending Pool",
        }
    }
}

/// 闪电贷请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashLoanRequest {
    pub source: FlashSource,
    pub asset: Address,
    pub amount: U256,
    /// 编码后的回调数据 (路径 + 形状标签)
    pub payload: Bytes,
}

impl FlashLoanRequest {
    pub fn lender(&self) -> Address {
        self.source.lender()
    }

    /// 预期手续费 (实际以出借方回调时给出的为准)
    pub fn expected_fee(&self) -> U256 {
        flash_fee(self.amount, self.source.fee_rate())
    }

    pub fn required_repayment(&self) -> U256 {
        self.amount.saturating_add(self.expected_fee())
    }

    /// 闪电兑换时借入资产在池内的数量槽位 (amount0, amount1)
    pub fn flash_amounts(&self) -> (U256, U256) {
        match &self.source {
            FlashSource::FlashSwapPool { key, .. } if key.token0 == self.asset => (self.amount, U256::zero()),
            FlashSource::FlashSwapPool { .. } => (U256::zero(), self.amount),
            FlashSource::LendingPool { .. } => (self.amount, U256::zero()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_fee_floors() {
        // 0.05% of 1_000_000 = 500
        assert_eq!(flash_fee(U256::from(1_000_000u64), 500), U256::from(500));
        // 999 * 3000 / 1e6 = 2.997 → 2
        assert_eq!(flash_fee(U256::from(999u64), 3000), U256::from(2));
        assert_eq!(flash_fee(U256::from(100u64), 0), U256::zero());
    }

    #[test]
    fn test_flash_fee_no_overflow() {
        let fee = flash_fee(U256::MAX, 500);
        assert!(fee < U256::MAX);
        assert!(!fee.is_zero());
    }

    #[test]
    fn test_mul_div() {
        assert_eq!(
            mul_div(U256::from(1800u64), U256::from(100u64), U256::from(1u64)),
            Some(U256::from(180_000u64))
        );
        assert_eq!(mul_div(U256::one(), U256::one(), U256::zero()), None);
    }

    #[test]
    fn test_request_amount_slots() {
        let t0 = Address::from_low_u64_be(1);
        let t1 = Address::from_low_u64_be(2);
        let key = PoolKey::new(t1, t0, 500);
        let request = FlashLoanRequest {
            source: FlashSource::FlashSwapPool { pool: Address::from_low_u64_be(9), key },
            asset: t1,
            amount: U256::from(10_000u64),
            payload: Bytes::default(),
        };
        assert_eq!(request.flash_amounts(), (U256::zero(), U256::from(10_000u64)));
        assert_eq!(request.required_repayment(), U256::from(10_005u64));
    }
}
