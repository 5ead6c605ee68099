//! 利润分配
//!
//! 先向出借方归还 borrowed + fee，净利润为正时按固定比例拆分给 treasury 与 owner。

use dex::TokenLedger;
use ethers::types::{Address, U256};
use models::{ArbitrageError, ProfitSplit, SettlementEvent};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ProfitDistributor {
    treasury: Address,
    owner: Address,
    tithe_percent: u32,
}

impl ProfitDistributor {
    pub fn new(treasury: Address, owner: Address, tithe_percent: u32) -> Self {
        Self {
            treasury,
            owner,
            tithe_percent,
        }
    }

    pub fn tithe_percent(&self) -> u32 {
        self.tithe_percent
    }

    pub fn split(&self, balance: U256, borrowed: U256, fee: U256) -> ProfitSplit {
        ProfitSplit::compute(balance, borrowed, fee, self.tithe_percent)
    }

    /// 执行还款与分配，`balance` 为还款前执行器持有的借入资产余额
    #[allow(clippy::too_many_arguments)]
    pub fn distribute(
        &self,
        ledger: &mut TokenLedger,
        executor: Address,
        token: Address,
        lender: Address,
        balance: U256,
        borrowed: U256,
        fee: U256,
    ) -> Result<ProfitSplit, ArbitrageError> {
        let split = self.split(balance, borrowed, fee);
        let total_repay = borrowed.saturating_add(fee);

        ledger
            .transfer(token, executor, lender, total_repay)
            .map_err(|_| ArbitrageError::InsufficientRepayment {
                required: total_repay,
                available: balance,
            })?;
        ledger.record_event(SettlementEvent::RepaymentCompleted {
            lender,
            token,
            amount: total_repay,
        });
        info!(target: "settlement", lender = ?lender, amount = %total_repay, "RepaymentCompleted");

        if !split.has_profit() {
            info!(target: "settlement", gross = %split.gross_profit, "净利润为零, 跳过分配");
            return Ok(split);
        }

        ledger.record_event(SettlementEvent::ProfitSplit {
            token,
            net_profit: split.net_profit,
            tithe: split.tithe_amount,
            operator_amount: split.operator_amount,
        });
        info!(
            target: "settlement",
            net = %split.net_profit,
            tithe = %split.tithe_amount,
            operator_amount = %split.operator_amount,
            "ProfitSplit"
        );

        if !split.tithe_amount.is_zero() {
            ledger
                .transfer(token, executor, self.treasury, split.tithe_amount)
                .map_err(|e| ArbitrageError::Settlement(format!("捐献转账失败: {}", e)))?;
            ledger.record_event(SettlementEvent::TithePaid {
                treasury: self.treasury,
                token,
                amount: split.tithe_amount,
            });
            info!(target: "settlement", treasury = ?self.treasury, amount = %split.tithe_amount, "TithePaid");
        }

        ledger
            .transfer(token, executor, self.owner, split.operator_amount)
            .map_err(|e| ArbitrageError::Settlement(format!("operator 转账失败: {}", e)))?;

        Ok(split)
    }
}
