/// 闪电贷提供商类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashLoanProvider {
    /// Uniswap V3 Flash (费率 = 池子 fee tier)
    UniswapV3,
    /// Aave V3 Flash Loan (固定 premium)
    AaveV3,
}

impl FlashLoanProvider {
    /// 获取提供商名称
    pub fn name(&self) -> &'static str {
        match self {
            FlashLoanProvider::UniswapV3 => "Uniswap V3",
            FlashLoanProvider::AaveV3 => "Aave V3",
        }
    }
}
