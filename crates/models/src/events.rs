use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{PathShape, ProfitSplit};

/// 结算记录 (Done 状态输出，供离线对账)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub lender: Address,
    pub borrow_token: Address,
    pub borrowed: U256,
    pub shape: PathShape,
    pub split: ProfitSplit,
    /// 每跳的实际输出
    pub hop_amounts: Vec<U256>,
    pub final_balance: U256,
}

impl SettlementRecord {
    pub fn total_repay(&self) -> U256 {
        self.borrowed.saturating_add(self.split.fee_paid)
    }
}

/// 结算事件 (对外可观测的非资金输出)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementEvent {
    HopExecuted {
        hop: usize,
        pool: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out: U256,
    },
    RepaymentCompleted {
        lender: Address,
        token: Address,
        amount: U256,
    },
    ProfitSplit {
        token: Address,
        net_profit: U256,
        tithe: U256,
        operator_amount: U256,
    },
    TithePaid {
        treasury: Address,
        token: Address,
        amount: U256,
    },
    Settled(SettlementRecord),
}

impl SettlementEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SettlementEvent::HopExecuted { .. } => "HopExecuted",
            SettlementEvent::RepaymentCompleted { .. } => "RepaymentCompleted",
            SettlementEvent::ProfitSplit { .. } => "ProfitSplit",
            SettlementEvent::TithePaid { .. } => "TithePaid",
            SettlementEvent::Settled(_) => "ArbitrageSettled",
        }
    }
}
