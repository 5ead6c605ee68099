use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::{Address, U256};
use models::{DexType, Pool, PoolState, SwapStep, UniswapV2PoolState};
use std::sync::Arc;

use super::contracts::v2_addresses;
use crate::common::DexProtocol;

// Uniswap V2 Pair ABI
abigen!(
    UniswapV2Pair,
    r#"[
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)
    ]"#
);

// Uniswap V2 Router ABI
abigen!(
    UniswapV2Router,
    r#"[
        function factory() external view returns (address)
        function getAmountsOut(uint amountIn, address[] memory path) public view returns (uint[] memory amounts)
    ]"#
);

// Uniswap V2 Factory ABI
abigen!(
    UniswapV2Factory,
    r#"[
        function getPair(address tokenA, address tokenB) external view returns (address pair)
    ]"#
);

/// Uniswap V2 协议实现
pub struct UniswapV2Protocol<M: Middleware> {
    provider: Arc<M>,
    router_address: Address,
}

impl<M: Middleware + 'static> UniswapV2Protocol<M> {
    pub fn new(provider: Arc<M>) -> Self {
        Self {
            provider,
            router_address: *v2_addresses::ROUTER,
        }
    }

    pub fn with_router(provider: Arc<M>, router_address: Address) -> Self {
        Self {
            provider,
            router_address,
        }
    }

    /// 获取储备量
    pub async fn get_reserves(&self, pair_address: Address) -> Result<(U256, U256, u32)> {
        let pair = UniswapV2Pair::new(pair_address, self.provider.clone());
        let (reserve0, reserve1, timestamp) = pair.get_reserves().call().await?;
        Ok((U256::from(reserve0), U256::from(reserve1), timestamp))
    }

    /// 路由只会经过工厂登记的交易对，配置的池子必须就是它
    pub async fn verify_pair(&self, pool: &Pool) -> Result<()> {
        let router = UniswapV2Router::new(self.router_address, self.provider.clone());
        let factory_address = router.factory().call().await.context("Router.factory 失败")?;
        let factory = UniswapV2Factory::new(factory_address, self.provider.clone());
        let pair = factory
            .get_pair(pool.token0, pool.token1)
            .call()
            .await
            .context("Factory.getPair 失败")?;
        if pair != pool.address {
            anyhow::bail!(
                "V2 池子 {:?} 不是路由 {:?} 对应工厂上的交易对 {:?}",
                pool.address,
                self.router_address,
                pair
            );
        }
        Ok(())
    }

    /// 多跳报价: 路由 getAmountsOut，取最后一个元素
    pub async fn quote_path(&self, path: Vec<Address>, amount_in: U256) -> Result<U256> {
        let router = UniswapV2Router::new(self.router_address, self.provider.clone());
        let amounts = router
            .get_amounts_out(amount_in, path)
            .call()
            .await
            .context("Router.getAmountsOut 失败")?;
        amounts
            .last()
            .copied()
            .context("getAmountsOut 返回空数组")
    }
}

#[async_trait]
impl<M: Middleware + 'static> DexProtocol for UniswapV2Protocol<M> {
    fn dex_type(&self) -> DexType {
        DexType::UniswapV2
    }

    async fn get_pool_state(&self, pool: &Pool) -> Result<PoolState> {
        let (reserve0, reserve1, timestamp) = self
            .get_reserves(pool.address)
            .await
            .with_context(|| format!("读取 V2 交易对 {:?} 储备失败", pool.address))?;

        Ok(PoolState::UniswapV2(UniswapV2PoolState {
            pool: pool.clone(),
            reserve0,
            reserve1,
            block_timestamp_last: timestamp,
        }))
    }

    async fn quote(&self, step: &SwapStep, amount_in: U256) -> Result<U256> {
        self.quote_path(vec![step.token_in, step.token_out], amount_in).await
    }
}
