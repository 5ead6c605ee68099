//! 结算提交客户端
//!
//! - `simulate`: 不改变状态的调用，返回预期的利润分配或回滚原因
//! - `estimate_gas`: 成本预估
//! - `submit`: 广播交易

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::{Address, H256, U256};
use models::{ArbitrageError, FlashLoanRequest, FlashSource, ProfitSplit};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::flash_arbitrage::{split_from_return, FlashArbitrageContract, SettlementReturn};

#[async_trait]
pub trait SettlementClient: Send + Sync {
    async fn simulate(&self, contract: Address, request: &FlashLoanRequest) -> Result<ProfitSplit, ArbitrageError>;

    async fn estimate_gas(&self, contract: Address, request: &FlashLoanRequest, hops: usize) -> Result<U256, ArbitrageError>;

    async fn submit(&self, contract: Address, request: &FlashLoanRequest) -> Result<H256, ArbitrageError>;
}

/// 通过 ethers 调用链上结算合约
pub struct ContractSettlementClient<M: Middleware> {
    client: Arc<M>,
    /// 签名地址，live 发送前与合约 owner 比对
    signer: Option<Address>,
}

impl<M: Middleware + 'static> ContractSettlementClient<M> {
    pub fn new(client: Arc<M>, signer: Option<Address>) -> Self {
        Self { client, signer }
    }

    fn settlement_call(&self, contract: Address, request: &FlashLoanRequest) -> ContractCall<M, SettlementReturn> {
        let contract = FlashArbitrageContract::new(contract, self.client.clone());
        match &request.source {
            FlashSource::FlashSwapPool { pool, .. } => {
                let (amount0, amount1) = request.flash_amounts();
                contract.execute_flash_swap(*pool, amount0, amount1, request.payload.clone())
            }
            FlashSource::LendingPool { pool, .. } => {
                contract.execute_flash_loan(*pool, request.asset, request.amount, request.payload.clone())
            }
        }
    }

    /// 校验签名地址是否为合约 owner
    async fn check_owner(&self, contract: Address) -> Result<(), ArbitrageError> {
        let signer = self
            .signer
            .ok_or_else(|| ArbitrageError::Configuration("未配置钱包，无法发送交易".to_string()))?;

        let owner = FlashArbitrageContract::new(contract, self.client.clone())
            .owner()
            .call()
            .await
            .map_err(|e| ArbitrageError::Submission(format!("读取合约 owner 失败: {}", e)))?;

        if owner != signer {
            warn!(target: "arbitrage_execution", "钱包地址 {:?} 不是合约 owner {:?}", signer, owner);
            return Err(ArbitrageError::Configuration(format!(
                "钱包地址 {:?} 不是合约 owner {:?}",
                signer, owner
            )));
        }
        debug!("Owner 校验通过: {:?}", signer);
        Ok(())
    }
}

#[async_trait]
impl<M: Middleware + 'static> SettlementClient for ContractSettlementClient<M> {
    async fn simulate(&self, contract: Address, request: &FlashLoanRequest) -> Result<ProfitSplit, ArbitrageError> {
        let ret = self
            .settlement_call(contract, request)
            .call()
            .await
            .map_err(|e| ArbitrageError::Submission(format!("模拟调用回滚: {}", e)))?;
        Ok(split_from_return(ret))
    }

    async fn estimate_gas(&self, contract: Address, request: &FlashLoanRequest, _hops: usize) -> Result<U256, ArbitrageError> {
        self.settlement_call(contract, request)
            .estimate_gas()
            .await
            .map_err(|e| ArbitrageError::Submission(format!("Gas 估算失败: {}", e)))
    }

    async fn submit(&self, contract: Address, request: &FlashLoanRequest) -> Result<H256, ArbitrageError> {
        self.check_owner(contract).await?;

        let call = self.settlement_call(contract, request);
        let pending = call
            .send()
            .await
            .map_err(|e| ArbitrageError::Submission(format!("发送交易失败: {}", e)))?;
        let tx_hash = *pending;
        info!(target: "arbitrage_execution", "交易已发送: {:?}", tx_hash);
        Ok(tx_hash)
    }
}
