use ethers::types::{Address, U256};
use models::{constant_product_amount_out, sort_tokens};
use std::collections::HashMap;

use super::check_deadline;
use crate::ledger::{LedgerError, TokenLedger};

/// Uniswap V2 风格的路由
///
/// 交易对的储备就是交易对地址在账本中的余额，0.3% 手续费
#[derive(Debug, Clone)]
pub struct ConstantProductRouter {
    address: Address,
    pairs: HashMap<(Address, Address), Address>,
}

impl ConstantProductRouter {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            pairs: HashMap::new(),
        }
    }

    /// 路由地址 (执行器授权的 spender)
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn add_pair(&mut self, token_a: Address, token_b: Address, pair: Address) {
        self.pairs.insert(sort_tokens(token_a, token_b), pair);
    }

    pub fn pair_for(&self, token_a: Address, token_b: Address) -> Option<Address> {
        self.pairs.get(&sort_tokens(token_a, token_b)).copied()
    }

    fn require_pair(&self, token_a: Address, token_b: Address) -> Result<Address, LedgerError> {
        self.pair_for(token_a, token_b)
            .ok_or_else(|| LedgerError::UnknownPool(format!("V2 pair {:?}/{:?}", token_a, token_b)))
    }

    /// 获取储备 (reserve_a, reserve_b)，顺序与传入代币一致
    pub fn get_reserves(&self, ledger: &TokenLedger, token_a: Address, token_b: Address) -> Result<(U256, U256), LedgerError> {
        let pair = self.require_pair(token_a, token_b)?;
        Ok((ledger.balance_of(token_a, pair), ledger.balance_of(token_b, pair)))
    }

    /// 按路径计算每一步的数量，首元素为输入
    pub fn get_amounts_out(&self, ledger: &TokenLedger, amount_in: U256, path: &[Address]) -> Result<Vec<U256>, LedgerError> {
        if path.len() < 2 {
            return Err(LedgerError::UnknownPool("V2 路径长度不足".to_string()));
        }

        let mut amounts = Vec::with_capacity(path.len());
        amounts.push(amount_in);
        for pair in path.windows(2) {
            let (reserve_in, reserve_out) = self.get_reserves(ledger, pair[0], pair[1])?;
            if reserve_in.is_zero() || reserve_out.is_zero() {
                return Err(LedgerError::InsufficientLiquidity(format!(
                    "V2 pair {:?}/{:?} 储备为零",
                    pair[0], pair[1]
                )));
            }
            let last = amounts[amounts.len() - 1];
            amounts.push(constant_product_amount_out(last, reserve_in, reserve_out));
        }
        Ok(amounts)
    }

    /// swapExactTokensForTokens: 从 sender 拉取输入，逐对兑换，最终输出发给 `to`
    #[allow(clippy::too_many_arguments)]
    pub fn swap_exact_tokens_for_tokens(
        &self,
        ledger: &mut TokenLedger,
        sender: Address,
        amount_in: U256,
        amount_out_min: U256,
        path: &[Address],
        to: Address,
        deadline: u64,
    ) -> Result<Vec<U256>, LedgerError> {
        check_deadline(deadline, ledger.timestamp())?;

        let amounts = self.get_amounts_out(ledger, amount_in, path)?;
        let amount_out = amounts.last().copied().unwrap_or_default();
        if amount_out < amount_out_min {
            return Err(LedgerError::InsufficientOutput {
                amount_out,
                amount_out_min,
            });
        }

        let first_pair = self.require_pair(path[0], path[1])?;
        ledger.transfer_from(path[0], self.address, sender, first_pair, amount_in)?;

        for (i, hop) in path.windows(2).enumerate() {
            let pair = self.require_pair(hop[0], hop[1])?;
            let recipient = match path.get(i + 2) {
                Some(next) => self.require_pair(hop[1], *next)?,
                None => to,
            };
            ledger.transfer(hop[1], pair, recipient, amounts[i + 1])?;
        }

        Ok(amounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn setup() -> (TokenLedger, ConstantProductRouter) {
        let mut ledger = TokenLedger::new();
        let mut router = ConstantProductRouter::new(addr(500));
        router.add_pair(addr(1), addr(2), addr(100));
        ledger.mint(addr(1), addr(100), U256::from(1_000_000u64));
        ledger.mint(addr(2), addr(100), U256::from(2_000_000u64));
        ledger.mint(addr(1), addr(9), U256::from(10_000u64));
        (ledger, router)
    }

    #[test]
    fn test_swap_takes_last_amount() {
        let (mut ledger, router) = setup();
        ledger.approve(addr(1), addr(9), router.address(), U256::from(10_000u64)).unwrap();

        let amounts = router
            .swap_exact_tokens_for_tokens(&mut ledger, addr(9), U256::from(10_000u64), U256::zero(), &[addr(1), addr(2)], addr(9), 0)
            .unwrap();

        let expected = constant_product_amount_out(U256::from(10_000u64), U256::from(1_000_000u64), U256::from(2_000_000u64));
        assert_eq!(amounts, vec![U256::from(10_000u64), expected]);
        assert_eq!(ledger.balance_of(addr(2), addr(9)), expected);
        assert_eq!(ledger.balance_of(addr(1), addr(100)), U256::from(1_010_000u64));
    }

    #[test]
    fn test_min_out_and_deadline() {
        let (mut ledger, router) = setup();
        ledger.approve(addr(1), addr(9), router.address(), U256::from(10_000u64)).unwrap();
        assert!(matches!(
            router.swap_exact_tokens_for_tokens(&mut ledger, addr(9), U256::from(10_000u64), U256::MAX, &[addr(1), addr(2)], addr(9), 0),
            Err(LedgerError::InsufficientOutput { .. })
        ));

        ledger.set_timestamp(100);
        assert!(matches!(
            router.swap_exact_tokens_for_tokens(&mut ledger, addr(9), U256::from(10_000u64), U256::zero(), &[addr(1), addr(2)], addr(9), 99),
            Err(LedgerError::Expired { .. })
        ));
    }
}
