#![allow(dead_code)]

use dex::{
    v3_addresses, AdapterSet, ConcentratedLiquidityRouter, ConstantProductRouter, FlashLender, FlashPoolCandidate,
    FlashSourceSelector, LocalDexProtocol, ProtocolSet, SharedLedger, TokenLedger, V3FlashPool,
};
use ethers::types::{Address, U256};
use executor::{
    ArbitrageCoordinator, CoordinatorConfig, FlashCallbackExecutor, LocalSettlementClient, SendMode, SettlementConfig,
};
use models::{DexType, Pool};
use std::sync::Arc;
use std::time::Duration;
use strategies::{OpportunityMonitor, PoolGroup, PreTradeSimulator, SimulatorConfig, StrategyRunner};

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

pub const BORROW: u64 = 10_000;

/// 本地账本上的完整流水线: V3(500) 上 1 A = 2 B，V2 上 1 A = v2_b/v2_a B
pub struct Pipeline {
    pub ledger: SharedLedger,
    pub protocols: ProtocolSet,
    pub executor: Arc<FlashCallbackExecutor>,
    pub flash_pool: Arc<V3FlashPool>,
    pub v3_pool: Pool,
    pub v2_pair: Pool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_v2_reserves(1_000_000, 1_800_000)
    }

    pub fn with_v2_reserves(reserve_a: u64, reserve_b: u64) -> Self {
        let a = addr(TOKEN_A);
        let b = addr(TOKEN_B);
        let config = SettlementConfig::new(addr(EXECUTOR), addr(OWNER), addr(TREASURY));

        let mut ledger = TokenLedger::new();
        let mut cl_router = ConcentratedLiquidityRouter::new(addr(CL_ROUTER));
        let mut cp_router = ConstantProductRouter::new(addr(CP_ROUTER));

        let v3 = config.canonical_pool(a, b, 500);
        cl_router.add_pool(v3, a, b, 500, U256::zero(), U256::zero());
        ledger.mint(a, v3, U256::from(1_000_000u64));
        ledger.mint(b, v3, U256::from(2_000_000u64));

        cp_router.add_pair(a, b, addr(V2_PAIR));
        ledger.mint(a, addr(V2_PAIR), U256::from(reserve_a));
        ledger.mint(b, addr(V2_PAIR), U256::from(reserve_b));

        let flash_pool = V3FlashPool::deploy(
            *v3_addresses::FACTORY,
            *v3_addresses::POOL_INIT_CODE_HASH,
            a,
            addr(TOKEN_C),
            500,
        );
        ledger.mint(a, flash_pool.address(), U256::from(1_000_000_000u64));

        let ledger = ledger.shared();
        let cl_router = Arc::new(cl_router);
        let cp_router = Arc::new(cp_router);
        let protocols = ProtocolSet::new()
            .with(Arc::new(LocalDexProtocol::concentrated(ledger.clone(), cl_router.clone())))
            .with(Arc::new(LocalDexProtocol::constant_product(ledger.clone(), cp_router.clone())));
        let adapters = AdapterSet::new()
            .with_concentrated(cl_router)
            .with_constant_product(cp_router);

        Self {
            ledger,
            protocols,
            executor: Arc::new(FlashCallbackExecutor::new(config, adapters)),
            flash_pool: Arc::new(flash_pool),
            v3_pool: Pool::new(v3, DexType::UniswapV3, a, b, 500),
            v2_pair: Pool::new(addr(V2_PAIR), DexType::UniswapV2, a, b, 3000),
        }
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            borrow_amount: U256::from(BORROW),
            probe_amount: U256::from(100u64),
            max_extrapolation_factor: 1000,
            verify_full_size: true,
            min_profit: U256::zero(),
            estimated_gas_cost: U256::zero(),
        }
    }

    pub fn runner(&self, mode: SendMode, simulator: SimulatorConfig) -> StrategyRunner {
        let group = PoolGroup::new("A/B", addr(TOKEN_A), vec![self.v3_pool.clone(), self.v2_pair.clone()])
            .expect("valid group");
        let monitor = OpportunityMonitor::new(vec![group], self.protocols.clone(), 30, U256::from(BORROW));
        let simulator = PreTradeSimulator::new(self.protocols.clone(), simulator);

        let selector = FlashSourceSelector::new(
            vec![FlashPoolCandidate {
                address: self.flash_pool.address(),
                key: self.flash_pool.key(),
            }],
            None,
        );
        let client = LocalSettlementClient::new(self.ledger.clone(), self.executor.clone(), addr(OWNER))
            .with_lender(self.flash_pool.clone());
        let coordinator = ArbitrageCoordinator::new(
            CoordinatorConfig {
                settlement_contract: Some(format!("{:?}", addr(EXECUTOR))),
                mode,
            },
            selector,
            Arc::new(client),
        );

        StrategyRunner::new(monitor, simulator, coordinator, Duration::from_millis(10), 50)
    }

    pub fn balance(&self, token: u64, holder: Address) -> U256 {
        self.ledger.lock().balance_of(addr(token), holder)
    }
}
