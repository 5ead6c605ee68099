use anyhow::{bail, Result};
use async_trait::async_trait;
use ethers::types::U256;
use models::{DexType, Pool, PoolState, SwapStep};

use crate::common::DexProtocol;

/// Curve 协议占位
///
/// 类型标签与适配器已保留，报价与状态读取均未启用
#[derive(Debug, Clone, Default)]
pub struct CurveProtocol;

#[async_trait]
impl DexProtocol for CurveProtocol {
    fn dex_type(&self) -> DexType {
        DexType::Curve
    }

    async fn get_pool_state(&self, pool: &Pool) -> Result<PoolState> {
        bail!("Curve 未启用: pool={:?}", pool.address)
    }

    async fn quote(&self, step: &SwapStep, _amount_in: U256) -> Result<U256> {
        bail!("Curve 未启用: pool={:?}", step.pool)
    }
}
