//! 闪电贷来源选择器
//!
//! 选择策略:
//! 1. 优先使用包含借入代币的 V3 闪电兑换池
//! 2. 池子不能与 swap 路径中的池子重复
//! 3. 多个候选时选择费率最低的
//! 4. 没有合适的 V3 池时退回通用借贷池 (单资产)

use ethers::types::{Address, U256};
use models::{flash_fee, ArbitrageError, FlashSource, Pool, PoolKey, SwapPath};
use tracing::{debug, info};

/// 可用作闪电贷来源的 V3 池
#[derive(Debug, Clone)]
pub struct FlashPoolCandidate {
    pub address: Address,
    pub key: PoolKey,
}

impl From<&Pool> for FlashPoolCandidate {
    fn from(pool: &Pool) -> Self {
        Self {
            address: pool.address,
            key: PoolKey::new(pool.token0, pool.token1, pool.fee),
        }
    }
}

/// 选择结果
#[derive(Debug, Clone)]
pub struct FlashSourceSelection {
    pub source: FlashSource,
    pub estimated_fee: U256,
}

#[derive(Debug, Clone, Default)]
pub struct FlashSourceSelector {
    flash_pools: Vec<FlashPoolCandidate>,
    lending_pool: Option<(Address, u32)>,
}

impl FlashSourceSelector {
    pub fn new(flash_pools: Vec<FlashPoolCandidate>, lending_pool: Option<(Address, u32)>) -> Self {
        Self {
            flash_pools,
            lending_pool,
        }
    }

    /// 为套利路径选择闪电贷来源
    pub fn select(&self, path: &SwapPath, borrow_amount: U256) -> Result<FlashSourceSelection, ArbitrageError> {
        let borrow_token = path.borrow_token;
        let excluded = path.pools();

        let best = self
            .flash_pools
            .iter()
            .filter(|c| c.key.token0 == borrow_token || c.key.token1 == borrow_token)
            .filter(|c| {
                let used = excluded.contains(&c.address);
                if used {
                    debug!("排除池子 {:?} (在 swap 路径中)", c.address);
                }
                !used
            })
            .min_by_key(|c| c.key.fee);

        let source = match (best, self.lending_pool) {
            (Some(candidate), _) => FlashSource::FlashSwapPool {
                pool: candidate.address,
                key: candidate.key,
            },
            (None, Some((pool, premium))) => FlashSource::LendingPool { pool, premium },
            (None, None) => {
                return Err(ArbitrageError::Configuration(format!(
                    "找不到合适的闪电贷来源: borrow_token={:?}",
                    borrow_token
                )))
            }
        };

        let estimated_fee = flash_fee(borrow_amount, source.fee_rate());
        info!(
            "选择闪电贷来源: {} {:?}, 费率={}, 预估费用={}",
            source.name(),
            source.lender(),
            source.fee_rate(),
            estimated_fee
        );

        Ok(FlashSourceSelection { source, estimated_fee })
    }
}
