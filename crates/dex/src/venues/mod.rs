//! 内存中的 AMM 场所 (储备即账本余额)

mod concentrated;
mod constant_product;

pub use concentrated::{ConcentratedLiquidityRouter, ConcentratedPool, ExactInputSingleParams};
pub use constant_product::ConstantProductRouter;

use crate::ledger::LedgerError;

/// 路由调用的截止时间检查
pub(crate) fn check_deadline(deadline: u64, now: u64) -> Result<(), LedgerError> {
    if deadline < now {
        return Err(LedgerError::Expired { deadline, now });
    }
    Ok(())
}
