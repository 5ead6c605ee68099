//! 套利协调器
//!
//! 把已验证的路径与形状标签打包成出借方对应的请求，
//! dry-run 模式只做模拟调用与成本估算，live 模式模拟通过后广播。
//! 结算合约地址缺失或格式错误时在任何网络调用之前失败。

use dex::FlashSourceSelector;
use ethers::types::{Address, U256};
use models::{ArbitrageError, ArbitrageRoute, CallbackPayload, FlashLoanRequest, FlashSource, PathShape, PoolKey, SwapPath};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::SettlementClient;
use crate::types::{CoordinatorOutcome, SendMode};

#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// 结算合约地址 (原始配置字符串)
    pub settlement_contract: Option<String>,
    pub mode: SendMode,
}

/// 解析结算合约地址
pub fn parse_settlement_contract(value: Option<&str>) -> Result<Address, ArbitrageError> {
    let raw = value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ArbitrageError::Configuration("未配置结算合约地址".to_string()))?;

    let address = Address::from_str(raw)
        .map_err(|e| ArbitrageError::Configuration(format!("结算合约地址格式错误 {}: {}", raw, e)))?;
    if address.is_zero() {
        return Err(ArbitrageError::Configuration("结算合约地址为零地址".to_string()));
    }
    Ok(address)
}

pub struct ArbitrageCoordinator {
    config: CoordinatorConfig,
    selector: FlashSourceSelector,
    client: Arc<dyn SettlementClient>,
}

impl ArbitrageCoordinator {
    pub fn new(config: CoordinatorConfig, selector: FlashSourceSelector, client: Arc<dyn SettlementClient>) -> Self {
        Self {
            config,
            selector,
            client,
        }
    }

    pub fn mode(&self) -> SendMode {
        self.config.mode
    }

    pub fn selector(&self) -> &FlashSourceSelector {
        &self.selector
    }

    /// 构造闪电贷请求: 选择来源并编码回调数据
    pub fn build_request(
        &self,
        path: &SwapPath,
        shape: PathShape,
        borrow_amount: U256,
    ) -> Result<FlashLoanRequest, ArbitrageError> {
        let route = ArbitrageRoute::from_path(path, shape)?;
        let selection = self.selector.select(path, borrow_amount)?;

        let pool_key = match &selection.source {
            FlashSource::FlashSwapPool { key, .. } => *key,
            FlashSource::LendingPool { .. } => PoolKey::default(),
        };
        let payload = CallbackPayload::new(pool_key, path.borrow_token, borrow_amount, route);

        Ok(FlashLoanRequest {
            source: selection.source,
            asset: path.borrow_token,
            amount: borrow_amount,
            payload: payload.encode(),
        })
    }

    /// 执行一次协调
    pub async fn execute(
        &self,
        path: &SwapPath,
        shape: PathShape,
        borrow_amount: U256,
    ) -> Result<CoordinatorOutcome, ArbitrageError> {
        let contract = parse_settlement_contract(self.config.settlement_contract.as_deref())?;
        let request = self.build_request(path, shape, borrow_amount)?;

        info!(
            target: "arbitrage_execution",
            mode = ?self.config.mode,
            shape = ?shape,
            lender = ?request.lender(),
            amount = %borrow_amount,
            "协调套利: {}",
            path.describe()
        );

        let simulated = self.client.simulate(contract, &request).await.map_err(|e| {
            warn!(target: "arbitrage_execution", "模拟调用失败, 放弃本次尝试: {}", e);
            e
        })?;
        let gas_estimate = self.client.estimate_gas(contract, &request, path.len()).await?;

        info!(
            target: "arbitrage_execution",
            net = %simulated.net_profit,
            tithe = %simulated.tithe_amount,
            gas = %gas_estimate,
            "模拟通过"
        );

        let tx_hash = match self.config.mode {
            SendMode::DryRun => {
                info!(target: "arbitrage_execution", "dry-run 模式, 不广播交易");
                None
            }
            SendMode::Live => Some(self.client.submit(contract, &request).await?),
        };

        Ok(CoordinatorOutcome {
            mode: self.config.mode,
            request,
            simulated,
            gas_estimate,
            tx_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settlement_contract() {
        assert!(matches!(parse_settlement_contract(None), Err(ArbitrageError::Configuration(_))));
        assert!(matches!(parse_settlement_contract(Some("  ")), Err(ArbitrageError::Configuration(_))));
        assert!(matches!(parse_settlement_contract(Some("0x1234")), Err(ArbitrageError::Configuration(_))));
        assert!(matches!(
            parse_settlement_contract(Some("0x0000000000000000000000000000000000000000")),
            Err(ArbitrageError::Configuration(_))
        ));
        assert_eq!(
            parse_settlement_contract(Some("0x00000000000000000000000000000000000000aa")).unwrap(),
            Address::from_low_u64_be(0xaa)
        );
    }
}
