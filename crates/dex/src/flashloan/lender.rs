//! 闪电贷出借方 (内存实现)
//!
//! 出借方把资金转给借款方，调用其回调，回调返回后检查余额是否已还上本金加手续费。

use ethers::types::{Address, H256, U256};
use models::{flash_fee, ArbitrageError, PoolKey};
use tracing::debug;

use super::providers::FlashLoanProvider;
use crate::ledger::TokenLedger;
use crate::uniswap::contracts::v3_addresses;

/// 借款方回调
pub trait FlashBorrower: Send + Sync {
    fn address(&self) -> Address;

    /// 单资产场所闪电兑换回调 (uniswapV3FlashCallback)
    fn on_flash_swap(
        &self,
        ledger: &mut TokenLedger,
        caller: Address,
        fee0: U256,
        fee1: U256,
        data: &[u8],
    ) -> Result<(), ArbitrageError>;

    /// 借贷池闪电贷回调 (executeOperation)
    #[allow(clippy::too_many_arguments)]
    fn on_flash_loan(
        &self,
        ledger: &mut TokenLedger,
        caller: Address,
        assets: &[Address],
        amounts: &[U256],
        premiums: &[U256],
        initiator: Address,
        params: &[u8],
    ) -> Result<(), ArbitrageError>;
}

/// 出借方
pub trait FlashLender: Send + Sync {
    fn address(&self) -> Address;

    fn provider(&self) -> FlashLoanProvider;

    /// 费率 (1e6 基数)
    fn fee_rate(&self) -> u32;

    /// 发起单资产闪电贷，`initiator` 为发起调用的地址
    fn flash(
        &self,
        ledger: &mut TokenLedger,
        borrower: &dyn FlashBorrower,
        initiator: Address,
        asset: Address,
        amount: U256,
        data: &[u8],
    ) -> Result<(), ArbitrageError>;
}

fn require_repaid(ledger: &TokenLedger, token: Address, holder: Address, required: U256) -> Result<(), ArbitrageError> {
    let available = ledger.balance_of(token, holder);
    if available < required {
        return Err(ArbitrageError::InsufficientRepayment { required, available });
    }
    Ok(())
}

/// Uniswap V3 风格的闪电兑换池
#[derive(Debug, Clone)]
pub struct V3FlashPool {
    address: Address,
    key: PoolKey,
}

impl V3FlashPool {
    pub fn new(address: Address, key: PoolKey) -> Self {
        Self { address, key }
    }

    /// 在工厂的确定性地址上创建
    pub fn deploy(factory: Address, init_code_hash: H256, token_a: Address, token_b: Address, fee: u32) -> Self {
        let key = PoolKey::new(token_a, token_b, fee);
        let address = v3_addresses::compute_pool_address(factory, key.token0, key.token1, fee, init_code_hash);
        Self { address, key }
    }

    pub fn key(&self) -> PoolKey {
        self.key
    }

    /// flash(recipient, amount0, amount1, data)
    pub fn flash_amounts(
        &self,
        ledger: &mut TokenLedger,
        borrower: &dyn FlashBorrower,
        amount0: U256,
        amount1: U256,
        data: &[u8],
    ) -> Result<(), ArbitrageError> {
        let fee0 = flash_fee(amount0, self.key.fee);
        let fee1 = flash_fee(amount1, self.key.fee);
        let balance0_before = ledger.balance_of(self.key.token0, self.address);
        let balance1_before = ledger.balance_of(self.key.token1, self.address);

        let recipient = borrower.address();
        for (token, amount) in [(self.key.token0, amount0), (self.key.token1, amount1)] {
            ledger
                .transfer(token, self.address, recipient, amount)
                .map_err(|e| ArbitrageError::Settlement(format!("闪电兑换池资金不足: {}", e)))?;
        }

        debug!(target: "settlement", pool = ?self.address, %amount0, %amount1, %fee0, %fee1, "flash");
        borrower.on_flash_swap(ledger, self.address, fee0, fee1, data)?;

        require_repaid(ledger, self.key.token0, self.address, balance0_before + fee0)?;
        require_repaid(ledger, self.key.token1, self.address, balance1_before + fee1)?;
        Ok(())
    }
}

impl FlashLender for V3FlashPool {
    fn address(&self) -> Address {
        self.address
    }

    fn provider(&self) -> FlashLoanProvider {
        FlashLoanProvider::UniswapV3
    }

    fn fee_rate(&self) -> u32 {
        self.key.fee
    }

    fn flash(
        &self,
        ledger: &mut TokenLedger,
        borrower: &dyn FlashBorrower,
        _initiator: Address,
        asset: Address,
        amount: U256,
        data: &[u8],
    ) -> Result<(), ArbitrageError> {
        let (amount0, amount1) = if asset == self.key.token0 {
            (amount, U256::zero())
        } else if asset == self.key.token1 {
            (U256::zero(), amount)
        } else {
            return Err(ArbitrageError::Configuration(format!(
                "闪电兑换池 {:?} 不包含资产 {:?}",
                self.address, asset
            )));
        };
        self.flash_amounts(ledger, borrower, amount0, amount1, data)
    }
}

/// Aave 风格的借贷池
#[derive(Debug, Clone)]
pub struct LendingPool {
    address: Address,
    /// premium (1e6 基数)
    premium: u32,
}

impl LendingPool {
    pub fn new(address: Address, premium: u32) -> Self {
        Self { address, premium }
    }

    /// flashLoan(receiver, assets, amounts, ...)
    pub fn flash_loan(
        &self,
        ledger: &mut TokenLedger,
        borrower: &dyn FlashBorrower,
        initiator: Address,
        assets: &[Address],
        amounts: &[U256],
        params: &[u8],
    ) -> Result<(), ArbitrageError> {
        if assets.len() != amounts.len() {
            return Err(ArbitrageError::Configuration("assets 与 amounts 长度不一致".to_string()));
        }

        let premiums: Vec<U256> = amounts.iter().map(|a| flash_fee(*a, self.premium)).collect();
        let before: Vec<U256> = assets.iter().map(|t| ledger.balance_of(*t, self.address)).collect();

        let receiver = borrower.address();
        for (token, amount) in assets.iter().zip(amounts) {
            ledger
                .transfer(*token, self.address, receiver, *amount)
                .map_err(|e| ArbitrageError::Settlement(format!("借贷池资金不足: {}", e)))?;
        }

        debug!(target: "settlement", pool = ?self.address, assets = assets.len(), "flashLoan");
        borrower.on_flash_loan(ledger, self.address, assets, amounts, &premiums, initiator, params)?;

        for ((token, balance_before), premium) in assets.iter().zip(before).zip(&premiums) {
            require_repaid(ledger, *token, self.address, balance_before + *premium)?;
        }
        Ok(())
    }
}

impl FlashLender for LendingPool {
    fn address(&self) -> Address {
        self.address
    }

    fn provider(&self) -> FlashLoanProvider {
        FlashLoanProvider::AaveV3
    }

    fn fee_rate(&self) -> u32 {
        self.premium
    }

    fn flash(
        &self,
        ledger: &mut TokenLedger,
        borrower: &dyn FlashBorrower,
        initiator: Address,
        asset: Address,
        amount: U256,
        data: &[u8],
    ) -> Result<(), ArbitrageError> {
        self.flash_loan(ledger, borrower, initiator, &[asset], &[amount], data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    /// 直接还款的借款方, repay_fee 为 false 时只还本金
    struct Repayer {
        address: Address,
        repay_fee: bool,
    }

    impl FlashBorrower for Repayer {
        fn address(&self) -> Address {
            self.address
        }

        fn on_flash_swap(
            &self,
            ledger: &mut TokenLedger,
            caller: Address,
            fee0: U256,
            _fee1: U256,
            _data: &[u8],
        ) -> Result<(), ArbitrageError> {
            let balance = ledger.balance_of(addr(1), self.address);
            let repay = if self.repay_fee { balance } else { balance - fee0 };
            ledger.transfer(addr(1), self.address, caller, repay).unwrap();
            Ok(())
        }

        fn on_flash_loan(
            &self,
            ledger: &mut TokenLedger,
            caller: Address,
            assets: &[Address],
            amounts: &[U256],
            premiums: &[U256],
            _initiator: Address,
            _params: &[u8],
        ) -> Result<(), ArbitrageError> {
            let repay = if self.repay_fee { amounts[0] + premiums[0] } else { amounts[0] };
            ledger.transfer(assets[0], self.address, caller, repay).unwrap();
            Ok(())
        }
    }

    #[test]
    fn test_v3_flash_requires_fee() {
        let pool = V3FlashPool::new(addr(50), PoolKey::new(addr(1), addr(2), 500));
        let mut ledger = TokenLedger::new();
        ledger.mint(addr(1), addr(50), U256::from(1_000_000u64));
        ledger.mint(addr(1), addr(9), U256::from(500u64));

        let good = Repayer { address: addr(9), repay_fee: true };
        pool.flash(&mut ledger, &good, addr(9), addr(1), U256::from(1_000_000u64), &[]).unwrap();
        assert_eq!(ledger.balance_of(addr(1), addr(50)), U256::from(1_000_500u64));

        let bad = Repayer { address: addr(9), repay_fee: false };
        ledger.mint(addr(1), addr(9), U256::from(500u64));
        let err = pool.flash(&mut ledger, &bad, addr(9), addr(1), U256::from(1_000_000u64), &[]).unwrap_err();
        assert!(matches!(err, ArbitrageError::InsufficientRepayment { .. }));
    }

    #[test]
    fn test_lending_pool_premium() {
        let pool = LendingPool::new(addr(60), 500);
        let mut ledger = TokenLedger::new();
        ledger.mint(addr(1), addr(60), U256::from(2_000_000u64));
        ledger.mint(addr(1), addr(9), U256::from(1_000u64));

        let good = Repayer { address: addr(9), repay_fee: true };
        pool.flash(&mut ledger, &good, addr(9), addr(1), U256::from(2_000_000u64), &[]).unwrap();
        assert_eq!(ledger.balance_of(addr(1), addr(60)), U256::from(2_001_000u64));
    }

    #[test]
    fn test_underfunded_lender_is_a_settlement_revert() {
        let pool = V3FlashPool::new(addr(50), PoolKey::new(addr(1), addr(2), 500));
        let mut ledger = TokenLedger::new();
        ledger.mint(addr(1), addr(50), U256::from(10u64));

        let borrower = Repayer { address: addr(9), repay_fee: true };
        let err = pool.flash(&mut ledger, &borrower, addr(9), addr(1), U256::from(100u64), &[]).unwrap_err();
        assert!(matches!(err, ArbitrageError::Settlement(_)));

        let lending = LendingPool::new(addr(60), 500);
        let err = lending.flash(&mut ledger, &borrower, addr(9), addr(1), U256::from(100u64), &[]).unwrap_err();
        assert!(matches!(err, ArbitrageError::Settlement(_)));
    }

    #[test]
    fn test_deploy_uses_canonical_address() {
        let factory = addr(0xfac);
        let hash = H256::repeat_byte(0x11);
        let pool = V3FlashPool::deploy(factory, hash, addr(2), addr(1), 500);
        assert_eq!(pool.key().token0, addr(1));
        assert_eq!(
            pool.address(),
            v3_addresses::compute_pool_address(factory, addr(1), addr(2), 500, hash)
        );
    }
}
