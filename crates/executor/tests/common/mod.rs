#![allow(dead_code)]

use dex::{
    v3_addresses, AdapterSet, ConcentratedLiquidityRouter, ConstantProductRouter, FlashLender, SharedLedger,
    TokenLedger, V3FlashPool,
};
use ethers::types::{Address, U256};
use executor::{FlashCallbackExecutor, SettlementConfig};
use models::{
    ArbitrageRoute, CallbackPayload, DexType, FlashLoanRequest, FlashSource, PathShape, Pool, PoolKey, SwapPath,
    SwapStep,
};
use std::sync::Arc;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub const TOKEN_A: u64 = 0xA1;
pub const TOKEN_B: u64 = 0xB2;
pub const TOKEN_C: u64 = 0xC3;
pub const EXECUTOR: u64 = 0xE0;
pub const OWNER: u64 = 0xE1;
pub const TREASURY: u64 = 0xE2;
pub const CL_ROUTER: u64 = 0xF0;
pub const CP_ROUTER: u64 = 0xF1;
pub const V2_PAIR: u64 = 0xD0;
pub const LENDING_POOL: u64 = 0xD1;

pub const BORROW: u64 = 10_000;

pub struct Fixture {
    pub ledger: SharedLedger,
    pub executor: Arc<FlashCallbackExecutor>,
    pub flash_pool: Arc<V3FlashPool>,
    pub v3_low_fee: Pool,
    pub v3_high_fee: Pool,
    pub v2_pair: Pool,
    pub v3_bc: Pool,
    pub v3_ca: Pool,
}

impl Fixture {
    /// V3(500) 上 1 A = 2 B，V3(3000) 与 V2 上 1 A = 1.8 B
    pub fn new() -> Self {
        Self::with_v2_reserves(1_000_000, 1_800_000)
    }

    pub fn with_v2_reserves(reserve_a: u64, reserve_b: u64) -> Self {
        let a = addr(TOKEN_A);
        let b = addr(TOKEN_B);
        let c = addr(TOKEN_C);
        let config = SettlementConfig::new(addr(EXECUTOR), addr(OWNER), addr(TREASURY));

        let mut ledger = TokenLedger::new();
        let mut cl_router = ConcentratedLiquidityRouter::new(addr(CL_ROUTER));
        let mut cp_router = ConstantProductRouter::new(addr(CP_ROUTER));

        let low = config.canonical_pool(a, b, 500);
        cl_router.add_pool(low, a, b, 500, U256::zero(), U256::zero());
        ledger.mint(a, low, U256::from(1_000_000u64));
        ledger.mint(b, low, U256::from(2_000_000u64));

        let high = config.canonical_pool(a, b, 3000);
        cl_router.add_pool(high, a, b, 3000, U256::zero(), U256::zero());
        ledger.mint(a, high, U256::from(1_000_000u64));
        ledger.mint(b, high, U256::from(1_800_000u64));

        // 三角路径: B/C(500) 上 1 B = 1 C，C/A(3000) 上 1 C = 0.55 A
        let bc = config.canonical_pool(b, c, 500);
        cl_router.add_pool(bc, b, c, 500, U256::zero(), U256::zero());
        ledger.mint(b, bc, U256::from(2_000_000u64));
        ledger.mint(c, bc, U256::from(2_000_000u64));

        let ca = config.canonical_pool(c, a, 3000);
        cl_router.add_pool(ca, c, a, 3000, U256::zero(), U256::zero());
        ledger.mint(c, ca, U256::from(2_000_000u64));
        ledger.mint(a, ca, U256::from(1_100_000u64));

        cp_router.add_pair(a, b, addr(V2_PAIR));
        ledger.mint(a, addr(V2_PAIR), U256::from(reserve_a));
        ledger.mint(b, addr(V2_PAIR), U256::from(reserve_b));

        let flash_pool = V3FlashPool::deploy(*v3_addresses::FACTORY, *v3_addresses::POOL_INIT_CODE_HASH, a, c, 500);
        ledger.mint(a, flash_pool.address(), U256::from(1_000_000_000u64));
        ledger.mint(a, addr(LENDING_POOL), U256::from(1_000_000_000u64));

        let adapters = AdapterSet::new()
            .with_concentrated(Arc::new(cl_router))
            .with_constant_product(Arc::new(cp_router));

        Self {
            ledger: ledger.shared(),
            executor: Arc::new(FlashCallbackExecutor::new(config, adapters)),
            flash_pool: Arc::new(flash_pool),
            v3_low_fee: Pool::new(low, DexType::UniswapV3, a, b, 500),
            v3_high_fee: Pool::new(high, DexType::UniswapV3, a, b, 3000),
            v2_pair: Pool::new(addr(V2_PAIR), DexType::UniswapV2, a, b, 3000),
            v3_bc: Pool::new(bc, DexType::UniswapV3, b, c, 500),
            v3_ca: Pool::new(ca, DexType::UniswapV3, c, a, 3000),
        }
    }

    /// A → B 在 `start`，B → A 在 `exit`
    pub fn two_venue_path(&self, start: &Pool, exit: &Pool, final_min: U256) -> SwapPath {
        let a = addr(TOKEN_A);
        let b = addr(TOKEN_B);
        SwapPath::with_steps(
            a,
            vec![SwapStep::new(start, a, b, U256::zero()), SwapStep::new(exit, b, a, final_min)],
        )
    }

    /// A → B → C → A
    pub fn triangular_path(&self, final_min: U256) -> SwapPath {
        let a = addr(TOKEN_A);
        let b = addr(TOKEN_B);
        let c = addr(TOKEN_C);
        SwapPath::with_steps(
            a,
            vec![
                SwapStep::new(&self.v3_low_fee, a, b, U256::zero()),
                SwapStep::new(&self.v3_bc, b, c, U256::zero()),
                SwapStep::new(&self.v3_ca, c, a, final_min),
            ],
        )
    }

    pub fn flash_swap_request(&self, path: &SwapPath, shape: PathShape, amount: U256) -> FlashLoanRequest {
        let key = self.flash_pool.key();
        let route = ArbitrageRoute::from_path(path, shape).unwrap();
        let payload = CallbackPayload::new(key, path.borrow_token, amount, route);
        FlashLoanRequest {
            source: FlashSource::FlashSwapPool {
                pool: self.flash_pool.address(),
                key,
            },
            asset: path.borrow_token,
            amount,
            payload: payload.encode(),
        }
    }

    pub fn lending_request(&self, path: &SwapPath, amount: U256) -> FlashLoanRequest {
        let route = ArbitrageRoute::from_path(path, PathShape::General).unwrap();
        let payload = CallbackPayload::new(PoolKey::default(), path.borrow_token, amount, route);
        FlashLoanRequest {
            source: FlashSource::LendingPool {
                pool: addr(LENDING_POOL),
                premium: 500,
            },
            asset: path.borrow_token,
            amount,
            payload: payload.encode(),
        }
    }

    pub fn balance(&self, token: u64, holder: Address) -> U256 {
        self.ledger.lock().balance_of(addr(token), holder)
    }
}
