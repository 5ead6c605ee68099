//! 场所适配器
//!
//! 封闭的适配器集合 (集中流动性 / 恒定乘积 / 预留)，按步骤的场所类型标签分派，
//! 统一为 `swap(tokenIn, tokenOut, amountIn, minOut) -> amountOut`

use ethers::types::{Address, U256};
use models::DexType;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ledger::{LedgerError, TokenLedger};
use crate::venues::{ConcentratedLiquidityRouter, ConstantProductRouter, ExactInputSingleParams};

/// 单跳兑换参数
#[derive(Debug, Clone)]
pub struct AdapterSwap {
    /// 步骤指定的场所，恒定乘积路由据此核对交易对
    pub pool: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub deadline: u64,
}

#[derive(Debug, Clone)]
pub enum DexAdapter {
    /// 单跳 exactInputSingle
    ConcentratedLiquidity(Arc<ConcentratedLiquidityRouter>),
    /// 路径数组兑换，取返回数组最后一个元素
    ConstantProduct(Arc<ConstantProductRouter>),
    /// 结构上存在但未启用的场所类型
    Reserved(DexType),
}

impl DexAdapter {
    /// 需要授权的 spender
    pub fn spender(&self) -> Option<Address> {
        match self {
            DexAdapter::ConcentratedLiquidity(router) => Some(router.address()),
            DexAdapter::ConstantProduct(router) => Some(router.address()),
            DexAdapter::Reserved(_) => None,
        }
    }

    pub fn dex_type(&self) -> DexType {
        match self {
            DexAdapter::ConcentratedLiquidity(_) => DexType::UniswapV3,
            DexAdapter::ConstantProduct(_) => DexType::UniswapV2,
            DexAdapter::Reserved(dex) => *dex,
        }
    }

    /// 以 `sender` 身份执行兑换，输出归 `sender`
    pub fn swap(&self, ledger: &mut TokenLedger, sender: Address, swap: &AdapterSwap) -> Result<U256, LedgerError> {
        match self {
            DexAdapter::ConcentratedLiquidity(router) => router.exact_input_single(
                ledger,
                sender,
                &ExactInputSingleParams {
                    token_in: swap.token_in,
                    token_out: swap.token_out,
                    fee: swap.fee,
                    recipient: sender,
                    deadline: swap.deadline,
                    amount_in: swap.amount_in,
                    amount_out_minimum: swap.min_amount_out,
                },
            ),
            DexAdapter::ConstantProduct(router) => {
                let pair = router.pair_for(swap.token_in, swap.token_out);
                if pair != Some(swap.pool) {
                    return Err(LedgerError::UnknownPool(format!(
                        "V2 交易对 {:?} 不是路由 {:?} 上 {:?}/{:?} 的交易对 ({:?})",
                        swap.pool,
                        router.address(),
                        swap.token_in,
                        swap.token_out,
                        pair
                    )));
                }
                let path = [swap.token_in, swap.token_out];
                let amounts = router.swap_exact_tokens_for_tokens(
                    ledger,
                    sender,
                    swap.amount_in,
                    swap.min_amount_out,
                    &path,
                    sender,
                    swap.deadline,
                )?;
                Ok(amounts.last().copied().unwrap_or_default())
            }
            DexAdapter::Reserved(dex) => Err(LedgerError::UnknownPool(format!("{} 适配器未启用", dex))),
        }
    }
}

/// 按场所类型索引的适配器集合
#[derive(Debug, Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<DexType, DexAdapter>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concentrated(mut self, router: Arc<ConcentratedLiquidityRouter>) -> Self {
        self.adapters.insert(DexType::UniswapV3, DexAdapter::ConcentratedLiquidity(router));
        self
    }

    pub fn with_constant_product(mut self, router: Arc<ConstantProductRouter>) -> Self {
        self.adapters.insert(DexType::UniswapV2, DexAdapter::ConstantProduct(router));
        self
    }

    /// 未注册的类型返回预留适配器
    pub fn for_type(&self, dex_type: DexType) -> DexAdapter {
        self.adapters
            .get(&dex_type)
            .cloned()
            .unwrap_or(DexAdapter::Reserved(dex_type))
    }
}
