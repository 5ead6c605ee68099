use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::U256;
use models::{DexType, Pool, PoolState, SwapStep};
use std::collections::HashMap;
use std::sync::Arc;

/// DEX 只读交互的通用 trait (状态读取与报价)
#[async_trait]
pub trait DexProtocol: Send + Sync {
    /// 获取 DEX 类型
    fn dex_type(&self) -> DexType;

    /// 获取池子状态 (tick/储备, 流动性)
    async fn get_pool_state(&self, pool: &Pool) -> Result<PoolState>;

    /// 单跳只读报价
    async fn quote(&self, step: &SwapStep, amount_in: U256) -> Result<U256>;
}

/// 按场所类型索引的协议集合，只包含已启用的类型
#[derive(Clone, Default)]
pub struct ProtocolSet {
    protocols: HashMap<DexType, Arc<dyn DexProtocol>>,
}

impl ProtocolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, protocol: Arc<dyn DexProtocol>) {
        self.protocols.insert(protocol.dex_type(), protocol);
    }

    pub fn with(mut self, protocol: Arc<dyn DexProtocol>) -> Self {
        self.register(protocol);
        self
    }

    pub fn get(&self, dex_type: DexType) -> Result<Arc<dyn DexProtocol>> {
        self.protocols
            .get(&dex_type)
            .cloned()
            .ok_or_else(|| anyhow!("{} 未启用", dex_type))
    }

    pub fn is_enabled(&self, dex_type: DexType) -> bool {
        self.protocols.contains_key(&dex_type)
    }

    /// 读取池子状态
    pub async fn pool_state(&self, pool: &Pool) -> Result<PoolState> {
        self.get(pool.dex_type)?.get_pool_state(pool).await
    }

    /// 单跳报价
    pub async fn quote(&self, step: &SwapStep, amount_in: U256) -> Result<U256> {
        self.get(step.dex_type)?.quote(step, amount_in).await
    }
}
