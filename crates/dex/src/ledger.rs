//! 代币账本
//!
//! 模拟结算执行器所修改的链上状态: 余额、授权、区块时间、转账记录与结算事件。
//! `atomic` 提供全有或全无的执行单元，闭包返回错误时账本恢复到进入前的快照。

use ethers::types::{Address, U256};
use models::SettlementEvent;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// 多个组件共享的账本
pub type SharedLedger = Arc<Mutex<TokenLedger>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("余额不足: token={token:?} holder={holder:?} 需要 {required}, 持有 {available}")]
    InsufficientBalance {
        token: Address,
        holder: Address,
        required: U256,
        available: U256,
    },

    #[error("授权不足: token={token:?} owner={owner:?} spender={spender:?} 需要 {required}, 授权 {available}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        required: U256,
        available: U256,
    },

    #[error("代币 {token:?} 不允许非零授权直接改为非零 (当前 {current})")]
    NonZeroApproval { token: Address, current: U256 },

    #[error("交易已过期: deadline={deadline}, now={now}")]
    Expired { deadline: u64, now: u64 },

    #[error("输出不足: 实际 {amount_out}, 最小 {amount_out_min}")]
    InsufficientOutput { amount_out: U256, amount_out_min: U256 },

    #[error("流动性不足: {0}")]
    InsufficientLiquidity(String),

    #[error("池子不存在: {0}")]
    UnknownPool(String),
}

/// 单笔转账记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, Default)]
pub struct TokenLedger {
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    strict_tokens: HashSet<Address>,
    timestamp: u64,
    transfers: Vec<TransferRecord>,
    events: Vec<SettlementEvent>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    /// 在原子执行单元内运行闭包，失败时恢复全部状态
    pub fn atomic<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    /// 铸造代币 (初始化余额)
    pub fn mint(&mut self, token: Address, to: Address, amount: U256) {
        let balance = self.balances.entry((token, to)).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.balances.get(&(token, holder)).copied().unwrap_or_default()
    }

    pub fn transfer(&mut self, token: Address, from: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
        let available = self.balance_of(token, from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                token,
                holder: from,
                required: amount,
                available,
            });
        }
        if amount.is_zero() {
            return Ok(());
        }

        self.balances.insert((token, from), available - amount);
        let to_balance = self.balances.entry((token, to)).or_default();
        *to_balance = to_balance.saturating_add(amount);
        self.transfers.push(TransferRecord { token, from, to, amount });
        Ok(())
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances.get(&(token, owner, spender)).copied().unwrap_or_default()
    }

    /// 设置授权；严格代币拒绝从非零直接改为非零
    pub fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: U256) -> Result<(), LedgerError> {
        let current = self.allowance(token, owner, spender);
        if self.strict_tokens.contains(&token) && !current.is_zero() && !amount.is_zero() {
            return Err(LedgerError::NonZeroApproval { token, current });
        }
        self.allowances.insert((token, owner, spender), amount);
        Ok(())
    }

    /// spender 代 from 转出，消耗授权
    pub fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let allowed = self.allowance(token, from, spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                token,
                owner: from,
                spender,
                required: amount,
                available: allowed,
            });
        }
        self.transfer(token, from, to, amount)?;
        self.allowances.insert((token, from, spender), allowed - amount);
        Ok(())
    }

    /// 标记代币为严格授权语义 (如 USDT)
    pub fn set_strict_approval(&mut self, token: Address) {
        self.strict_tokens.insert(token);
    }

    pub fn transfers(&self) -> &[TransferRecord] {
        &self.transfers
    }

    pub fn record_event(&mut self, event: SettlementEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SettlementEvent] {
        &self.events
    }

    /// 全部非零余额快照，用于比较执行前后状态
    pub fn balances_snapshot(&self) -> HashMap<(Address, Address), U256> {
        self.balances
            .iter()
            .filter(|(_, v)| !v.is_zero())
            .map(|(k, v)| (*k, *v))
            .collect()
    }
}
