//! 交易前模拟
//!
//! 用探测数量 P 逐跳链式报价得到 Q，再按 Q·B/P 线性外推到借入数量 B。
//! B/P 超过上限时把 P 提高到 ceil(B/上限)；开启全量校验时再用 B 报价一次，取两者较小值。

use anyhow::{Context, Result};
use config_crate::SimulatorSettings;
use dex::ProtocolSet;
use ethers::types::U256;
use models::{flash_fee, mul_div, ArbitrageError, SimulationFailure, SwapPath, ValidationError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub borrow_amount: U256,
    pub probe_amount: U256,
    pub max_extrapolation_factor: u64,
    pub verify_full_size: bool,
    pub min_profit: U256,
    pub estimated_gas_cost: U256,
}

impl SimulatorConfig {
    pub fn from_settings(settings: &SimulatorSettings) -> Result<Self> {
        Ok(Self {
            borrow_amount: parse_amount(&settings.borrow_amount).context("Invalid BORROW_AMOUNT")?,
            probe_amount: parse_amount(&settings.probe_amount).context("Invalid PROBE_AMOUNT")?,
            max_extrapolation_factor: settings.max_extrapolation_factor,
            verify_full_size: settings.verify_full_size,
            min_profit: parse_amount(&settings.min_profit).context("Invalid MIN_PROFIT")?,
            estimated_gas_cost: parse_amount(&settings.estimated_gas_cost).context("Invalid ESTIMATED_GAS_COST")?,
        })
    }
}

fn parse_amount(raw: &str) -> Result<U256> {
    U256::from_dec_str(raw.trim()).map_err(|e| anyhow::anyhow!("{}: {:?}", raw, e))
}

/// 实际使用的探测数量，保证 P < B 且 B/P 不超过外推上限
pub fn effective_probe(borrow: U256, probe: U256, max_factor: u64) -> Option<U256> {
    if borrow < U256::from(2u64) {
        return None;
    }
    let factor = U256::from(max_factor.max(2));
    let (quotient, remainder) = borrow.div_mod(factor);
    let bounded = if remainder.is_zero() { quotient } else { quotient + U256::one() };

    if probe.is_zero() || probe >= borrow {
        return Some(bounded);
    }
    let exceeds = match probe.checked_mul(factor) {
        Some(scaled) => borrow > scaled,
        None => false,
    };
    Some(if exceeds { bounded } else { probe })
}

/// 单次模拟结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub borrow_amount: U256,
    pub probe_amount: U256,
    /// 探测数量走完整条路径的输出 Q
    pub probe_output: U256,
    /// Q·B/P
    pub linear_estimate: U256,
    pub full_size_output: Option<U256>,
    /// 线性外推与全量报价的较小值
    pub estimated_final: U256,
    pub flash_fee: U256,
    pub required_repayment: U256,
    pub margin: U256,
    pub proceed: bool,
}

impl SimulationReport {
    /// 最后一跳的最小输出: 不低于还款额，并按滑点容忍度收紧
    pub fn final_min_output(&self, max_slippage_bps: u32) -> U256 {
        let slippage = U256::from(10_000u32.saturating_sub(max_slippage_bps));
        let tolerated = mul_div(self.estimated_final, slippage, U256::from(10_000u32)).unwrap_or_default();
        tolerated.max(self.required_repayment)
    }
}

pub struct PreTradeSimulator {
    protocols: ProtocolSet,
    config: SimulatorConfig,
}

impl PreTradeSimulator {
    pub fn new(protocols: ProtocolSet, config: SimulatorConfig) -> Self {
        Self { protocols, config }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// 逐跳链式报价，返回每一跳的输出
    pub async fn quote_path(&self, path: &SwapPath, amount_in: U256) -> Result<Vec<U256>, SimulationFailure> {
        let mut amount = amount_in;
        let mut outputs = Vec::with_capacity(path.len());
        for (hop, step) in path.steps.iter().enumerate() {
            let failure = |reason: String| SimulationFailure {
                hop,
                pool: step.pool,
                dex: step.dex_type,
                amount_in: amount,
                fee: step.fee,
                reason,
            };
            let out = self
                .protocols
                .quote(step, amount)
                .await
                .map_err(|e| failure(format!("{:#}", e)))?;
            if out.is_zero() {
                return Err(failure("报价输出为零".to_string()));
            }
            debug!(target: "strategy", "  hop {}: {:?} {} → {}", hop, step.pool, amount, out);
            outputs.push(out);
            amount = out;
        }
        Ok(outputs)
    }

    /// 估算借入 B 走完路径的最终输出并判断是否值得执行
    pub async fn simulate(&self, path: &SwapPath, flash_fee_rate: u32) -> Result<SimulationReport, ArbitrageError> {
        let borrow = self.config.borrow_amount;
        let probe = effective_probe(borrow, self.config.probe_amount, self.config.max_extrapolation_factor)
            .ok_or_else(|| ArbitrageError::Configuration(format!("借入数量 {} 过小, 无法选择探测数量", borrow)))?;
        if probe != self.config.probe_amount {
            debug!(target: "strategy", "探测数量调整为 {} (配置 {})", probe, self.config.probe_amount);
        }

        let probe_output = self.final_output(path, probe).await?;
        let linear_estimate = mul_div(probe_output, borrow, probe).ok_or_else(|| {
            let last = path.len().saturating_sub(1);
            let step = &path.steps[last];
            ArbitrageError::Simulation(SimulationFailure {
                hop: last,
                pool: step.pool,
                dex: step.dex_type,
                amount_in: probe,
                fee: step.fee,
                reason: format!("线性外推溢出: {} * {} / {}", probe_output, borrow, probe),
            })
        })?;

        let full_size_output = if self.config.verify_full_size {
            Some(self.final_output(path, borrow).await?)
        } else {
            None
        };
        let estimated_final = full_size_output.map_or(linear_estimate, |full| full.min(linear_estimate));

        let flash_fee = flash_fee(borrow, flash_fee_rate);
        let required_repayment = borrow.saturating_add(flash_fee);
        let margin = estimated_final.saturating_sub(required_repayment);
        let threshold = self.config.min_profit.saturating_add(self.config.estimated_gas_cost);
        let proceed = estimated_final > required_repayment && margin > threshold;

        let report = SimulationReport {
            borrow_amount: borrow,
            probe_amount: probe,
            probe_output,
            linear_estimate,
            full_size_output,
            estimated_final,
            flash_fee,
            required_repayment,
            margin,
            proceed,
        };

        if proceed {
            info!(
                target: "strategy",
                "模拟通过: {} | 预估输出 {} (线性 {}, 全量 {:?}), 还款 {}, 利润空间 {}",
                path.describe(),
                estimated_final,
                linear_estimate,
                full_size_output,
                required_repayment,
                margin
            );
        } else {
            info!(
                target: "strategy",
                "模拟未通过: {} | 预估输出 {}, 还款 {}, 利润空间 {} <= 门槛 {}",
                path.describe(),
                estimated_final,
                required_repayment,
                margin,
                threshold
            );
        }
        Ok(report)
    }

    async fn final_output(&self, path: &SwapPath, amount_in: U256) -> Result<U256, ArbitrageError> {
        let outputs = self.quote_path(path, amount_in).await.map_err(|failure| {
            warn!(target: "strategy", "{}", failure);
            ArbitrageError::Simulation(failure)
        })?;
        outputs
            .last()
            .copied()
            .ok_or_else(|| ArbitrageError::Validation(ValidationError::InvalidPath("空路径".to_string())))
    }
}
