//! 基于内存账本的结算客户端
//!
//! simulate 在账本副本上运行完整结算 (不改变共享状态)，submit 在共享账本上执行。

use async_trait::async_trait;
use dex::{FlashLender, SharedLedger};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use models::{ArbitrageError, FlashLoanRequest, ProfitSplit};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::client::SettlementClient;
use crate::settlement::FlashCallbackExecutor;
use crate::types::estimate_arbitrage_gas;

pub struct LocalSettlementClient {
    ledger: SharedLedger,
    executor: Arc<FlashCallbackExecutor>,
    lenders: HashMap<Address, Arc<dyn FlashLender>>,
    /// 发送交易的账户 (执行器 owner)
    sender: Address,
    nonce: AtomicU64,
}

impl LocalSettlementClient {
    pub fn new(ledger: SharedLedger, executor: Arc<FlashCallbackExecutor>, sender: Address) -> Self {
        Self {
            ledger,
            executor,
            lenders: HashMap::new(),
            sender,
            nonce: AtomicU64::new(0),
        }
    }

    pub fn with_lender(mut self, lender: Arc<dyn FlashLender>) -> Self {
        self.lenders.insert(lender.address(), lender);
        self
    }

    fn resolve(&self, contract: Address, request: &FlashLoanRequest) -> Result<Arc<dyn FlashLender>, ArbitrageError> {
        if contract != self.executor.config().executor_address {
            return Err(ArbitrageError::Configuration(format!(
                "结算合约 {:?} 不是本地执行器 {:?}",
                contract,
                self.executor.config().executor_address
            )));
        }
        self.lenders
            .get(&request.lender())
            .cloned()
            .ok_or_else(|| ArbitrageError::Submission(format!("出借方 {:?} 未注册", request.lender())))
    }
}

#[async_trait]
impl SettlementClient for LocalSettlementClient {
    async fn simulate(&self, contract: Address, request: &FlashLoanRequest) -> Result<ProfitSplit, ArbitrageError> {
        let lender = self.resolve(contract, request)?;
        let mut scratch = self.ledger.lock().clone();
        let record = self.executor.initiate(&mut scratch, self.sender, lender.as_ref(), request)?;
        Ok(record.split)
    }

    async fn estimate_gas(&self, contract: Address, request: &FlashLoanRequest, hops: usize) -> Result<U256, ArbitrageError> {
        self.resolve(contract, request)?;
        Ok(estimate_arbitrage_gas(hops, true))
    }

    async fn submit(&self, contract: Address, request: &FlashLoanRequest) -> Result<H256, ArbitrageError> {
        let lender = self.resolve(contract, request)?;
        let record = {
            let mut ledger = self.ledger.lock();
            self.executor.initiate(&mut ledger, self.sender, lender.as_ref(), request)?
        };

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut preimage = request.payload.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = H256::from(keccak256(preimage));

        info!(
            target: "arbitrage_execution",
            tx = ?tx_hash,
            net = %record.split.net_profit,
            "本地结算完成"
        );
        Ok(tx_hash)
    }
}
