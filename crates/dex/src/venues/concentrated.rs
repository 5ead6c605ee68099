use ethers::types::{Address, U256};
use models::{mul_div, PoolKey, FEE_DENOMINATOR};
use std::collections::HashMap;

use super::check_deadline;
use crate::ledger::{LedgerError, TokenLedger};

/// 单区间集中流动性池
///
/// 区间内的交易等价于虚拟储备上的恒定乘积: (x + L/√Pb)(y + L·√Pa) = L²，
/// 虚拟储备 = 账本余额 + 固定偏移
#[derive(Debug, Clone)]
pub struct ConcentratedPool {
    pub address: Address,
    pub key: PoolKey,
    pub offset0: U256,
    pub offset1: U256,
}

impl ConcentratedPool {
    /// 虚拟储备 (token0, token1)
    pub fn virtual_reserves(&self, ledger: &TokenLedger) -> (U256, U256) {
        (
            ledger.balance_of(self.key.token0, self.address).saturating_add(self.offset0),
            ledger.balance_of(self.key.token1, self.address).saturating_add(self.offset1),
        )
    }
}

/// exactInputSingle 参数
#[derive(Debug, Clone)]
pub struct ExactInputSingleParams {
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,
    pub recipient: Address,
    pub deadline: u64,
    pub amount_in: U256,
    pub amount_out_minimum: U256,
}

/// Uniswap V3 风格的路由 (池子按 token0/token1/fee 定位)
#[derive(Debug, Clone)]
pub struct ConcentratedLiquidityRouter {
    address: Address,
    pools: HashMap<PoolKey, ConcentratedPool>,
}

impl ConcentratedLiquidityRouter {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            pools: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// 注册池子，偏移量与传入代币顺序一致
    pub fn add_pool(
        &mut self,
        pool: Address,
        token_a: Address,
        token_b: Address,
        fee: u32,
        offset_a: U256,
        offset_b: U256,
    ) -> PoolKey {
        let key = PoolKey::new(token_a, token_b, fee);
        let (offset0, offset1) = if key.token0 == token_a {
            (offset_a, offset_b)
        } else {
            (offset_b, offset_a)
        };
        self.pools.insert(
            key,
            ConcentratedPool {
                address: pool,
                key,
                offset0,
                offset1,
            },
        );
        key
    }

    pub fn pool(&self, token_a: Address, token_b: Address, fee: u32) -> Option<&ConcentratedPool> {
        self.pools.get(&PoolKey::new(token_a, token_b, fee))
    }

    pub fn pool_by_address(&self, address: Address) -> Option<&ConcentratedPool> {
        self.pools.values().find(|p| p.address == address)
    }

    fn require_pool(&self, token_in: Address, token_out: Address, fee: u32) -> Result<&ConcentratedPool, LedgerError> {
        self.pool(token_in, token_out, fee)
            .ok_or_else(|| LedgerError::UnknownPool(format!("V3 pool {:?}/{:?} fee={}", token_in, token_out, fee)))
    }

    /// 精确输入报价 (只读)
    pub fn quote_exact_input_single(
        &self,
        ledger: &TokenLedger,
        token_in: Address,
        token_out: Address,
        fee: u32,
        amount_in: U256,
    ) -> Result<U256, LedgerError> {
        let pool = self.require_pool(token_in, token_out, fee)?;
        let (v0, v1) = pool.virtual_reserves(ledger);
        let (reserve_in, reserve_out) = if token_in == pool.key.token0 { (v0, v1) } else { (v1, v0) };

        let fee_complement = U256::from(FEE_DENOMINATOR.saturating_sub(fee as u64));
        let amount_in_less_fee = mul_div(amount_in, fee_complement, U256::from(FEE_DENOMINATOR))
            .ok_or_else(|| LedgerError::InsufficientLiquidity("输入溢出".to_string()))?;
        let denominator = reserve_in.saturating_add(amount_in_less_fee);
        let amount_out = mul_div(amount_in_less_fee, reserve_out, denominator)
            .ok_or_else(|| LedgerError::InsufficientLiquidity(format!("池子 {:?} 无流动性", pool.address)))?;

        let real_out = ledger.balance_of(token_out, pool.address);
        if amount_out > real_out {
            return Err(LedgerError::InsufficientLiquidity(format!(
                "池子 {:?} 输出 {} 超出区间内余额 {}",
                pool.address, amount_out, real_out
            )));
        }
        Ok(amount_out)
    }

    /// exactInputSingle: 从 sender 拉取输入，输出发给 recipient
    pub fn exact_input_single(
        &self,
        ledger: &mut TokenLedger,
        sender: Address,
        params: &ExactInputSingleParams,
    ) -> Result<U256, LedgerError> {
        check_deadline(params.deadline, ledger.timestamp())?;

        let amount_out = self.quote_exact_input_single(ledger, params.token_in, params.token_out, params.fee, params.amount_in)?;
        if amount_out < params.amount_out_minimum {
            return Err(LedgerError::InsufficientOutput {
                amount_out,
                amount_out_min: params.amount_out_minimum,
            });
        }

        let pool = self.require_pool(params.token_in, params.token_out, params.fee)?.address;
        ledger.transfer_from(params.token_in, self.address, sender, pool, params.amount_in)?;
        ledger.transfer(params.token_out, pool, params.recipient, amount_out)?;
        Ok(amount_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_offsets_deepen_virtual_reserves() {
        let mut ledger = TokenLedger::new();
        let mut router = ConcentratedLiquidityRouter::new(addr(600));
        router.add_pool(addr(200), addr(1), addr(2), 500, U256::from(9_000_000u64), U256::from(9_000_000u64));
        ledger.mint(addr(1), addr(200), U256::from(1_000_000u64));
        ledger.mint(addr(2), addr(200), U256::from(1_000_000u64));

        let out = router
            .quote_exact_input_single(&ledger, addr(1), addr(2), 500, U256::from(10_000u64))
            .unwrap();
        // 9995 * 10_000_000 / (10_000_000 + 9995)
        assert_eq!(out, U256::from(9985u64));
    }

    #[test]
    fn test_output_beyond_real_balance_reverts() {
        let mut ledger = TokenLedger::new();
        let mut router = ConcentratedLiquidityRouter::new(addr(600));
        router.add_pool(addr(200), addr(1), addr(2), 500, U256::from(1_000_000_000u64), U256::from(1_000_000_000u64));
        ledger.mint(addr(2), addr(200), U256::from(100u64));

        assert!(matches!(
            router.quote_exact_input_single(&ledger, addr(1), addr(2), 500, U256::from(10_000u64)),
            Err(LedgerError::InsufficientLiquidity(_))
        ));
    }

    #[test]
    fn test_exact_input_single_moves_funds() {
        let mut ledger = TokenLedger::new();
        let mut router = ConcentratedLiquidityRouter::new(addr(600));
        router.add_pool(addr(200), addr(1), addr(2), 3000, U256::zero(), U256::zero());
        ledger.mint(addr(1), addr(200), U256::from(1_000_000u64));
        ledger.mint(addr(2), addr(200), U256::from(1_000_000u64));
        ledger.mint(addr(1), addr(9), U256::from(1_000u64));
        ledger.approve(addr(1), addr(9), router.address(), U256::from(1_000u64)).unwrap();

        let params = ExactInputSingleParams {
            token_in: addr(1),
            token_out: addr(2),
            fee: 3000,
            recipient: addr(9),
            deadline: 0,
            amount_in: U256::from(1_000u64),
            amount_out_minimum: U256::one(),
        };
        let out = router.exact_input_single(&mut ledger, addr(9), &params).unwrap();
        assert_eq!(ledger.balance_of(addr(2), addr(9)), out);
        assert_eq!(ledger.balance_of(addr(1), addr(9)), U256::zero());
        assert_eq!(ledger.allowance(addr(1), addr(9), router.address()), U256::zero());
    }
}
