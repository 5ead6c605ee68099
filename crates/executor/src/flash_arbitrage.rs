//! 结算合约 ABI 绑定

use ethers::prelude::*;

abigen!(
    FlashArbitrageContract,
    r#"[
        function executeFlashSwap(address pool, uint256 amount0, uint256 amount1, bytes data) external returns (uint256 grossProfit, uint256 feePaid, uint256 netProfit, uint256 titheAmount, uint256 operatorAmount)
        function executeFlashLoan(address lendingPool, address asset, uint256 amount, bytes data) external returns (uint256 grossProfit, uint256 feePaid, uint256 netProfit, uint256 titheAmount, uint256 operatorAmount)
        function owner() external view returns (address)
        function treasury() external view returns (address)
        event HopExecuted(uint8 indexed hop, address indexed pool, address tokenIn, address tokenOut, uint256 amountIn, uint256 amountOut)
        event RepaymentCompleted(address indexed lender, address indexed token, uint256 amount)
        event ProfitSplit(address indexed token, uint256 netProfit, uint256 tithe, uint256 operatorAmount)
        event TithePaid(address indexed treasury, address indexed token, uint256 amount)
        event ArbitrageSettled(address indexed token, uint256 borrowed, uint256 grossProfit, uint256 feePaid, uint256 netProfit)
    ]"#
);

/// executeFlashSwap / executeFlashLoan 的返回值
pub type SettlementReturn = (U256, U256, U256, U256, U256);

/// 把合约返回的元组转换为利润分配结构
pub fn split_from_return(ret: SettlementReturn) -> models::ProfitSplit {
    let (gross_profit, fee_paid, net_profit, tithe_amount, operator_amount) = ret;
    models::ProfitSplit {
        gross_profit,
        fee_paid,
        net_profit,
        tithe_amount,
        operator_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_from_return_field_order() {
        let split = split_from_return((
            U256::from(1005u64),
            U256::from(5u64),
            U256::from(1000u64),
            U256::from(300u64),
            U256::from(700u64),
        ));
        assert_eq!(split.fee_paid, U256::from(5u64));
        assert_eq!(split.tithe_amount + split.operator_amount, split.net_profit);
    }
}
