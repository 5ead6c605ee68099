//! 协调器类型定义

use ethers::types::{H256, U256};
use models::{FlashLoanRequest, ProfitSplit};
use serde::{Deserialize, Serialize};

/// 交易发送模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SendMode {
    /// 只做不改变状态的模拟调用与成本估算
    #[default]
    DryRun,
    /// 模拟通过后广播
    Live,
}

impl SendMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            SendMode::DryRun
        } else {
            SendMode::Live
        }
    }
}

/// 一次协调的结果
#[derive(Debug, Clone)]
pub struct CoordinatorOutcome {
    pub mode: SendMode,
    pub request: FlashLoanRequest,
    /// 模拟调用返回的利润分配
    pub simulated: ProfitSplit,
    pub gas_estimate: U256,
    /// 仅 live 模式
    pub tx_hash: Option<H256>,
}

impl CoordinatorOutcome {
    pub fn is_submitted(&self) -> bool {
        self.tx_hash.is_some()
    }
}

/// 估算套利 gas: 21000 基础 + 每跳 150000 + 闪电贷 100000，再加 20% 余量
pub fn estimate_arbitrage_gas(hops: usize, flash: bool) -> U256 {
    let mut gas = 21_000u64 + 150_000 * hops as u64;
    if flash {
        gas += 100_000;
    }
    U256::from(gas * 120 / 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_estimate() {
        // (21000 + 300000 + 100000) * 1.2
        assert_eq!(estimate_arbitrage_gas(2, true), U256::from(505_200u64));
        assert_eq!(estimate_arbitrage_gas(1, false), U256::from(205_200u64));
    }
}
