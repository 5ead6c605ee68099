//! 闪电贷回调结算执行器
//!
//! 状态机: Idle → CallbackReceived → Validated → SwapsExecuting → RepaymentChecked → ProfitDistributed → Done，
//! 任一非 Idle 状态失败进入 Reverted。
//!
//! 整个回调在账本的原子执行单元内运行: 任何一步返回错误，所有余额、授权与事件都恢复到回调之前。

use dex::{v3_addresses, AdapterSet, AdapterSwap, FlashBorrower, FlashLender, LedgerError, TokenLedger};
use ethers::types::{Address, H256, U256};
use models::{
    ArbitrageError, CallbackPayload, FlashLoanRequest, SettlementEvent, SettlementRecord, SwapPath,
    ValidationError, DEFAULT_TITHE_PERCENT,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::distributor::ProfitDistributor;

/// 结算状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementState {
    Idle,
    CallbackReceived,
    Validated,
    SwapsExecuting,
    RepaymentChecked,
    ProfitDistributed,
    Done,
    Reverted,
}

/// 执行器的不可变参数
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// 执行器自身地址 (持有借入资金，授权给场所)
    pub executor_address: Address,
    /// 唯一允许发起闪电贷的地址，也是 operator 份额的接收方
    pub owner: Address,
    /// 捐献接收地址
    pub treasury: Address,
    /// 捐献比例 (百分比)
    pub tithe_percent: u32,
    /// 池地址派生所用的工厂
    pub v3_factory: Address,
    pub v3_init_code_hash: H256,
    /// 每次兑换的截止时间偏移 (秒)
    pub deadline_offset_secs: u64,
}

impl SettlementConfig {
    pub fn new(executor_address: Address, owner: Address, treasury: Address) -> Self {
        Self {
            executor_address,
            owner,
            treasury,
            tithe_percent: DEFAULT_TITHE_PERCENT,
            v3_factory: *v3_addresses::FACTORY,
            v3_init_code_hash: *v3_addresses::POOL_INIT_CODE_HASH,
            deadline_offset_secs: 120,
        }
    }

    /// (token0, token1, fee) 对应的规范池地址
    pub fn canonical_pool(&self, token_a: Address, token_b: Address, fee: u32) -> Address {
        v3_addresses::compute_pool_address(self.v3_factory, token_a, token_b, fee, self.v3_init_code_hash)
    }
}

/// 回调在途标记，离开作用域时清除 (包括失败路径)
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FlashCallbackExecutor {
    config: SettlementConfig,
    adapters: AdapterSet,
    distributor: ProfitDistributor,
    in_flight: AtomicBool,
    /// 构造请求时记录的出借方，回调时与调用者逐字比对
    recorded_lender: Mutex<Option<Address>>,
    state: Mutex<SettlementState>,
}

impl FlashCallbackExecutor {
    pub fn new(config: SettlementConfig, adapters: AdapterSet) -> Self {
        let distributor = ProfitDistributor::new(config.treasury, config.owner, config.tithe_percent);
        Self {
            config,
            adapters,
            distributor,
            in_flight: AtomicBool::new(false),
            recorded_lender: Mutex::new(None),
            state: Mutex::new(SettlementState::Idle),
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn state(&self) -> SettlementState {
        *self.state.lock()
    }

    /// 发起闪电贷 (仅 owner)
    ///
    /// 记录出借方身份后调用出借方，整个尝试在账本原子单元内执行，成功时返回结算记录
    pub fn initiate(
        &self,
        ledger: &mut TokenLedger,
        sender: Address,
        lender: &dyn FlashLender,
        request: &FlashLoanRequest,
    ) -> Result<SettlementRecord, ArbitrageError> {
        if sender != self.config.owner {
            return Err(ValidationError::UnauthorizedCaller {
                expected: Some(self.config.owner),
                actual: sender,
            }
            .into());
        }
        if lender.address() != request.lender() {
            return Err(ArbitrageError::Settlement(format!(
                "出借方 {:?} 与请求中的来源 {:?} 不一致",
                lender.address(),
                request.lender()
            )));
        }

        {
            let mut recorded = self.recorded_lender.lock();
            if recorded.is_some() {
                return Err(ValidationError::Reentrancy.into());
            }
            *recorded = Some(request.lender());
        }
        self.set_state(SettlementState::Idle);

        info!(
            target: "settlement",
            lender = ?request.lender(),
            provider = lender.provider().name(),
            fee_rate = lender.fee_rate(),
            source = request.source.name(),
            asset = ?request.asset,
            amount = %request.amount,
            "发起闪电贷"
        );

        let result = ledger.atomic(|l| {
            lender.flash(l, self, self.config.executor_address, request.asset, request.amount, &request.payload)?;
            l.events()
                .iter()
                .rev()
                .find_map(|e| match e {
                    SettlementEvent::Settled(record) => Some(record.clone()),
                    _ => None,
                })
                .ok_or_else(|| ArbitrageError::Settlement("出借方未调用结算回调".to_string()))
        });

        *self.recorded_lender.lock() = None;
        if let Err(e) = &result {
            self.set_state(SettlementState::Reverted);
            warn!(target: "settlement", kind = e.kind(), "结算回滚: {}", e);
        }
        result
    }

    fn set_state(&self, next: SettlementState) {
        let mut state = self.state.lock();
        debug!(target: "settlement", from = ?*state, to = ?next, "状态转换");
        *state = next;
    }

    fn enter(&self) -> Result<InFlightGuard<'_>, ValidationError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ValidationError::Reentrancy)?;
        Ok(InFlightGuard(&self.in_flight))
    }

    fn verify_caller(&self, caller: Address) -> Result<(), ValidationError> {
        let expected = *self.recorded_lender.lock();
        match expected {
            Some(lender) if lender == caller => Ok(()),
            _ => Err(ValidationError::UnauthorizedCaller { expected, actual: caller }),
        }
    }

    /// 回调入口公共部分: 互斥、原子执行、失败时进入 Reverted
    fn run_callback(
        &self,
        ledger: &mut TokenLedger,
        body: impl FnOnce(&mut TokenLedger) -> Result<(), ArbitrageError>,
    ) -> Result<(), ArbitrageError> {
        let _guard = self.enter()?;
        self.set_state(SettlementState::CallbackReceived);

        let result = ledger.atomic(body);
        match &result {
            Ok(()) => self.set_state(SettlementState::Done),
            Err(_) => self.set_state(SettlementState::Reverted),
        }
        result
    }

    fn handle_flash_swap(
        &self,
        ledger: &mut TokenLedger,
        caller: Address,
        fee0: U256,
        fee1: U256,
        data: &[u8],
    ) -> Result<(), ArbitrageError> {
        self.verify_caller(caller)?;
        let payload = CallbackPayload::decode(data)?;

        let key = payload.pool_key;
        if key.is_empty() {
            return Err(ValidationError::MalformedPayload("闪电兑换缺少池身份".to_string()).into());
        }
        let computed = self.config.canonical_pool(key.token0, key.token1, key.fee);
        if computed != caller {
            return Err(ValidationError::PoolIdentityMismatch { computed, caller }.into());
        }

        let fee = if payload.borrow_token == key.token0 && fee1.is_zero() {
            fee0
        } else if payload.borrow_token == key.token1 && fee0.is_zero() {
            fee1
        } else {
            return Err(ValidationError::FeeSlotMismatch(format!(
                "借入 {:?}, 池 ({:?}, {:?}), fee0={}, fee1={}",
                payload.borrow_token, key.token0, key.token1, fee0, fee1
            ))
            .into());
        };

        self.set_state(SettlementState::Validated);
        self.settle(ledger, caller, payload, fee)
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_flash_loan(
        &self,
        ledger: &mut TokenLedger,
        caller: Address,
        assets: &[Address],
        amounts: &[U256],
        premiums: &[U256],
        initiator: Address,
        params: &[u8],
    ) -> Result<(), ArbitrageError> {
        self.verify_caller(caller)?;

        if assets.len() != 1 || amounts.len() != 1 || premiums.len() != 1 {
            return Err(ValidationError::UnsupportedAssetCount(assets.len()).into());
        }
        if initiator != self.config.executor_address {
            return Err(ValidationError::InvalidInitiator {
                expected: self.config.executor_address,
                actual: initiator,
            }
            .into());
        }

        let payload = CallbackPayload::decode(params)?;
        if payload.borrow_token != assets[0] || payload.borrow_amount != amounts[0] {
            return Err(ValidationError::MalformedPayload(format!(
                "回调资产 {:?}/{} 与数据中的 {:?}/{} 不一致",
                assets[0], amounts[0], payload.borrow_token, payload.borrow_amount
            ))
            .into());
        }

        self.set_state(SettlementState::Validated);
        self.settle(ledger, caller, payload, premiums[0])
    }

    /// 依次执行兑换、检查还款、分配利润
    ///
    /// `fee` 为出借方在回调时给出的手续费
    fn settle(
        &self,
        ledger: &mut TokenLedger,
        lender: Address,
        payload: CallbackPayload,
        fee: U256,
    ) -> Result<(), ArbitrageError> {
        let shape = payload.shape();
        let steps = payload
            .route
            .to_steps(|a, b, tier| self.config.canonical_pool(a, b, tier));
        let path = SwapPath::with_steps(payload.borrow_token, steps);
        path.validate()?;

        self.set_state(SettlementState::SwapsExecuting);
        let executor = self.config.executor_address;
        let deadline = ledger.timestamp() + self.config.deadline_offset_secs;
        let mut amount = payload.borrow_amount;
        let mut hop_amounts = Vec::with_capacity(path.len());

        for (hop, step) in path.steps.iter().enumerate() {
            let swap_error = |reason: String| ArbitrageError::SwapExecution {
                hop,
                dex: step.dex_type,
                reason,
            };

            let adapter = self.adapters.for_type(step.dex_type);
            let spender = adapter
                .spender()
                .ok_or_else(|| swap_error(format!("{} 适配器未启用", step.dex_type)))?;
            force_approve(ledger, step.token_in, executor, spender, amount).map_err(|e| swap_error(e.to_string()))?;

            let swap = AdapterSwap {
                pool: step.pool,
                token_in: step.token_in,
                token_out: step.token_out,
                fee: step.fee,
                amount_in: amount,
                min_amount_out: step.min_amount_out,
                deadline,
            };
            let amount_out = adapter
                .swap(ledger, executor, &swap)
                .map_err(|e| swap_error(e.to_string()))?;
            if amount_out.is_zero() {
                return Err(swap_error("输出为零".to_string()));
            }

            info!(
                target: "settlement",
                hop,
                pool = ?step.pool,
                dex = %step.dex_type,
                amount_in = %amount,
                amount_out = %amount_out,
                "HopExecuted"
            );
            ledger.record_event(SettlementEvent::HopExecuted {
                hop,
                pool: step.pool,
                token_in: step.token_in,
                token_out: step.token_out,
                amount_in: amount,
                amount_out,
            });

            hop_amounts.push(amount_out);
            amount = amount_out;
        }

        let token = payload.borrow_token;
        let borrowed = payload.borrow_amount;
        let total_repay = borrowed.saturating_add(fee);
        let balance = ledger.balance_of(token, executor);
        if balance < total_repay {
            return Err(ArbitrageError::InsufficientRepayment {
                required: total_repay,
                available: balance,
            });
        }
        self.set_state(SettlementState::RepaymentChecked);

        let split = self
            .distributor
            .distribute(ledger, executor, token, lender, balance, borrowed, fee)?;
        self.set_state(SettlementState::ProfitDistributed);

        let record = SettlementRecord {
            lender,
            borrow_token: token,
            borrowed,
            shape,
            split,
            hop_amounts,
            final_balance: balance,
        };
        info!(
            target: "settlement",
            gross = %split.gross_profit,
            fee = %split.fee_paid,
            net = %split.net_profit,
            hops = record.hop_amounts.len(),
            "ArbitrageSettled"
        );
        ledger.record_event(SettlementEvent::Settled(record));
        Ok(())
    }
}

/// 授权恰好为本跳输入；残留非零授权先清零
fn force_approve(
    ledger: &mut TokenLedger,
    token: Address,
    owner: Address,
    spender: Address,
    amount: U256,
) -> Result<(), LedgerError> {
    if !ledger.allowance(token, owner, spender).is_zero() {
        ledger.approve(token, owner, spender, U256::zero())?;
    }
    ledger.approve(token, owner, spender, amount)
}

impl FlashBorrower for FlashCallbackExecutor {
    fn address(&self) -> Address {
        self.config.executor_address
    }

    fn on_flash_swap(
        &self,
        ledger: &mut TokenLedger,
        caller: Address,
        fee0: U256,
        fee1: U256,
        data: &[u8],
    ) -> Result<(), ArbitrageError> {
        self.run_callback(ledger, |l| self.handle_flash_swap(l, caller, fee0, fee1, data))
    }

    fn on_flash_loan(
        &self,
        ledger: &mut TokenLedger,
        caller: Address,
        assets: &[Address],
        amounts: &[U256],
        premiums: &[U256],
        initiator: Address,
        params: &[u8],
    ) -> Result<(), ArbitrageError> {
        self.run_callback(ledger, |l| {
            self.handle_flash_loan(l, caller, assets, amounts, premiums, initiator, params)
        })
    }
}
