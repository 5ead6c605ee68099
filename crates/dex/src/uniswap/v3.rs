use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::{Address, U256};
use models::{DexType, Pool, PoolState, SwapStep, UniswapV3PoolState};
use std::sync::Arc;
use tracing::debug;

use super::contracts::v3_addresses;
use crate::common::DexProtocol;

// Uniswap V3 Pool ABI
abigen!(
    UniswapV3Pool,
    r#"[
        function liquidity() external view returns (uint128)
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked)
    ]"#
);

// Uniswap V3 QuoterV2 ABI
abigen!(
    UniswapV3QuoterV2,
    r#"[
        function quoteExactInputSingle(address tokenIn, address tokenOut, uint24 fee, uint256 amountIn, uint160 sqrtPriceLimitX96) external returns (uint256 amountOut, uint160 sqrtPriceX96After, uint32 initializedTicksCrossed, uint256 gasEstimate)
    ]"#
);

/// Uniswap V3 协议实现 (链上读取 + QuoterV2 报价)
pub struct UniswapV3Protocol<M: Middleware> {
    provider: Arc<M>,
    quoter_address: Address,
}

impl<M: Middleware + 'static> UniswapV3Protocol<M> {
    pub fn new(provider: Arc<M>) -> Self {
        Self {
            provider,
            quoter_address: *v3_addresses::QUOTER_V2,
        }
    }

    pub fn with_quoter(provider: Arc<M>, quoter_address: Address) -> Self {
        Self {
            provider,
            quoter_address,
        }
    }

    fn get_pool_contract(&self, pool_address: Address) -> UniswapV3Pool<M> {
        UniswapV3Pool::new(pool_address, self.provider.clone())
    }

    fn get_quoter_contract(&self) -> UniswapV3QuoterV2<M> {
        UniswapV3QuoterV2::new(self.quoter_address, self.provider.clone())
    }

    /// 单跳精确输入报价
    pub async fn quote_exact_input_single(
        &self,
        token_in: Address,
        token_out: Address,
        fee: u32,
        amount_in: U256,
    ) -> Result<U256> {
        // sqrtPriceLimitX96 = 0 表示不限制价格
        let (amount_out, _sqrt_price_after, ticks_crossed, _gas_estimate) = self
            .get_quoter_contract()
            .quote_exact_input_single(token_in, token_out, fee, amount_in, U256::zero())
            .call()
            .await
            .context("QuoterV2.quoteExactInputSingle 失败")?;

        debug!("V3 Quoter 结果: amountOut={}, ticksCrossed={}", amount_out, ticks_crossed);
        Ok(amount_out)
    }
}

#[async_trait]
impl<M: Middleware + 'static> DexProtocol for UniswapV3Protocol<M> {
    fn dex_type(&self) -> DexType {
        DexType::UniswapV3
    }

    async fn get_pool_state(&self, pool: &Pool) -> Result<PoolState> {
        let contract = self.get_pool_contract(pool.address);

        let slot0_call = contract.slot_0();
        let liquidity_call = contract.liquidity();
        let ((sqrt_price_x96, tick, ..), liquidity) = tokio::try_join!(slot0_call.call(), liquidity_call.call())
            .with_context(|| format!("读取 V3 池 {:?} 状态失败", pool.address))?;

        Ok(PoolState::UniswapV3(UniswapV3PoolState {
            pool: pool.clone(),
            sqrt_price_x96,
            tick,
            liquidity,
        }))
    }

    async fn quote(&self, step: &SwapStep, amount_in: U256) -> Result<U256> {
        self.quote_exact_input_single(step.token_in, step.token_out, step.fee, amount_in)
            .await
    }
}
