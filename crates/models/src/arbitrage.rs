use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{DexType, Pool, ValidationError};

/// 套利路径中的单跳
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapStep {
    pub pool: Address,
    pub dex_type: DexType,
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,              // 仅对分级费率的场所有意义
    pub min_amount_out: U256,
}

impl SwapStep {
    pub fn new(pool: &Pool, token_in: Address, token_out: Address, min_amount_out: U256) -> Self {
        Self {
            pool: pool.address,
            dex_type: pool.dex_type,
            token_in,
            token_out,
            fee: pool.fee,
            min_amount_out,
        }
    }
}

/// 套利路径 (闭环)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPath {
    pub borrow_token: Address,
    pub steps: Vec<SwapStep>,
}

impl SwapPath {
    pub fn new(borrow_token: Address) -> Self {
        Self {
            borrow_token,
            steps: Vec::new(),
        }
    }

    pub fn with_steps(borrow_token: Address, steps: Vec<SwapStep>) -> Self {
        Self { borrow_token, steps }
    }

    pub fn add_step(&mut self, step: SwapStep) {
        self.steps.push(step);
    }

    /// 检查路径是否形成闭环
    pub fn is_closed_loop(&self) -> bool {
        match self.steps.last() {
            Some(last) => last.token_out == self.borrow_token,
            None => false,
        }
    }

    /// 校验路径: 非空、首跳输入为借入资产、逐跳衔接、闭环
    pub fn validate(&self) -> Result<(), ValidationError> {
        let first = self
            .steps
            .first()
            .ok_or_else(|| ValidationError::InvalidPath("路径为空".to_string()))?;

        if first.token_in != self.borrow_token {
            return Err(ValidationError::InvalidPath(format!(
                "首跳输入 {:?} 不是借入资产 {:?}",
                first.token_in, self.borrow_token
            )));
        }

        for (i, pair) in self.steps.windows(2).enumerate() {
            if pair[0].token_out != pair[1].token_in {
                return Err(ValidationError::InvalidPath(format!(
                    "第 {} 跳输出 {:?} 与第 {} 跳输入 {:?} 不衔接",
                    i,
                    pair[0].token_out,
                    i + 1,
                    pair[1].token_in
                )));
            }
        }

        if !self.is_closed_loop() {
            return Err(ValidationError::InvalidPath("路径未回到借入资产".to_string()));
        }

        Ok(())
    }

    /// 路径涉及的全部池地址 (去重)
    pub fn pools(&self) -> HashSet<Address> {
        self.steps.iter().map(|s| s.pool).collect()
    }

    pub fn uses_pool(&self, pool: Address) -> bool {
        self.steps.iter().any(|s| s.pool == pool)
    }

    /// 路径是否只包含集中流动性场所
    pub fn all_v3(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.dex_type.is_v3_style())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 路径描述，用于日志
    pub fn describe(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("{:?}->{:?}@{}({})", s.token_in, s.token_out, s.dex_type, s.fee))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// 交易方向 (相对起始池的 token0/token1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    /// 在起始池卖出 token0 换 token1
    ZeroForOne,
    /// 在起始池卖出 token1 换 token0
    OneForZero,
}

/// 套利机会 (只在单个监控周期内存在)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub id: String,
    pub group: String,
    /// 首跳场所 (借入资产在此卖出)
    pub start_pool: Pool,
    /// 回程场所 (买回借入资产)
    pub exit_pool: Pool,
    pub direction: TradeDirection,
    pub borrow_token: Address,
    pub intermediate_token: Address,
    pub start_price: f64,
    pub exit_price: f64,
    pub spread_bps: u32,
    /// 基于价差和池费率的链下粗估利润 (借入资产原始单位)
    pub estimated_profit: U256,
    pub created_at: DateTime<Utc>,
}

impl ArbitrageOpportunity {
    /// 检查套利是否有利可图
    pub fn is_profitable(&self, min_profit: U256) -> bool {
        self.estimated_profit > min_profit
    }
}
