//! 基于内存账本的 DEX 协议实现
//!
//! 用于离线运行与集成测试: 池子状态与报价都直接读取 `TokenLedger`，
//! 与执行器在同一账本上结算，保证报价与实际成交一致。

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::types::{Address, U256, U512};
use models::{DexType, Pool, PoolState, SwapStep, UniswapV2PoolState, UniswapV3PoolState};
use std::sync::Arc;

use crate::common::DexProtocol;
use crate::ledger::SharedLedger;
use crate::venues::{ConcentratedLiquidityRouter, ConstantProductRouter};

enum LocalVenue {
    Concentrated(Arc<ConcentratedLiquidityRouter>),
    ConstantProduct(Arc<ConstantProductRouter>),
}

pub struct LocalDexProtocol {
    ledger: SharedLedger,
    venue: LocalVenue,
}

impl LocalDexProtocol {
    pub fn concentrated(ledger: SharedLedger, router: Arc<ConcentratedLiquidityRouter>) -> Self {
        Self {
            ledger,
            venue: LocalVenue::Concentrated(router),
        }
    }

    pub fn constant_product(ledger: SharedLedger, router: Arc<ConstantProductRouter>) -> Self {
        Self {
            ledger,
            venue: LocalVenue::ConstantProduct(router),
        }
    }
}

/// sqrt(reserve1 / reserve0) * 2^96
fn sqrt_price_x96(reserve0: U256, reserve1: U256) -> U256 {
    if reserve0.is_zero() {
        return U256::zero();
    }
    let ratio = (U512::from(reserve1) << 192) / U512::from(reserve0);
    U256::try_from(ratio.integer_sqrt()).unwrap_or(U256::MAX)
}

/// L = sqrt(x * y)
fn liquidity_of(reserve0: U256, reserve1: U256) -> u128 {
    let root = reserve0.full_mul(reserve1).integer_sqrt();
    U256::try_from(root)
        .ok()
        .filter(|l| l.bits() <= 128)
        .map(|l| l.as_u128())
        .unwrap_or(u128::MAX)
}

/// 路由上 (token_a, token_b) 的交易对必须就是指定的场所
fn require_routed_pair(router: &ConstantProductRouter, pool: Address, token_a: Address, token_b: Address) -> Result<()> {
    match router.pair_for(token_a, token_b) {
        Some(pair) if pair == pool => Ok(()),
        other => Err(anyhow!(
            "V2 交易对 {:?} 不是路由 {:?} 上的交易对 (路由给出 {:?})",
            pool,
            router.address(),
            other
        )),
    }
}

fn tick_for_price(price: f64) -> i32 {
    if price <= 0.0 {
        return 0;
    }
    (price.ln() / 1.0001_f64.ln()).floor() as i32
}

#[async_trait]
impl DexProtocol for LocalDexProtocol {
    fn dex_type(&self) -> DexType {
        match self.venue {
            LocalVenue::Concentrated(_) => DexType::UniswapV3,
            LocalVenue::ConstantProduct(_) => DexType::UniswapV2,
        }
    }

    async fn get_pool_state(&self, pool: &Pool) -> Result<PoolState> {
        let ledger = self.ledger.lock();
        match &self.venue {
            LocalVenue::Concentrated(router) => {
                let registered = router
                    .pool_by_address(pool.address)
                    .ok_or_else(|| anyhow!("V3 池 {:?} 未注册", pool.address))?;
                let (v0, v1) = registered.virtual_reserves(&ledger);

                // 区间内任一侧真实余额为零时视为无流动性
                let in_range = !ledger.balance_of(pool.token0, pool.address).is_zero()
                    && !ledger.balance_of(pool.token1, pool.address).is_zero();
                let liquidity = if in_range { liquidity_of(v0, v1) } else { 0 };

                let mut state = UniswapV3PoolState {
                    pool: pool.clone(),
                    sqrt_price_x96: sqrt_price_x96(v0, v1),
                    tick: 0,
                    liquidity,
                };
                state.tick = tick_for_price(state.get_price());
                Ok(PoolState::UniswapV3(state))
            }
            LocalVenue::ConstantProduct(router) => {
                require_routed_pair(router, pool.address, pool.token0, pool.token1)?;
                let (reserve0, reserve1) = router
                    .get_reserves(&ledger, pool.token0, pool.token1)
                    .with_context(|| format!("V2 交易对 {:?} 未注册", pool.address))?;
                Ok(PoolState::UniswapV2(UniswapV2PoolState {
                    pool: pool.clone(),
                    reserve0,
                    reserve1,
                    block_timestamp_last: ledger.timestamp() as u32,
                }))
            }
        }
    }

    async fn quote(&self, step: &SwapStep, amount_in: U256) -> Result<U256> {
        let ledger = self.ledger.lock();
        let amount_out = match &self.venue {
            LocalVenue::Concentrated(router) => {
                router.quote_exact_input_single(&ledger, step.token_in, step.token_out, step.fee, amount_in)?
            }
            LocalVenue::ConstantProduct(router) => {
                require_routed_pair(router, step.pool, step.token_in, step.token_out)?;
                let amounts = router.get_amounts_out(&ledger, amount_in, &[step.token_in, step.token_out])?;
                amounts.last().copied().context("getAmountsOut 返回空数组")?
            }
        };
        Ok(amount_out)
    }
}
