mod common;

use async_trait::async_trait;
use common::*;
use dex::{FlashLender, FlashPoolCandidate, FlashSourceSelector};
use ethers::types::{Address, H256, U256};
use executor::{ArbitrageCoordinator, CoordinatorConfig, LocalSettlementClient, SendMode, SettlementClient};
use models::{ArbitrageError, FlashLoanRequest, FlashSource, PathShape, ProfitSplit};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn contract() -> Option<String> {
    Some(format!("{:?}", addr(EXECUTOR)))
}

fn coordinator(fx: &Fixture, mode: SendMode) -> ArbitrageCoordinator {
    let selector = FlashSourceSelector::new(
        vec![FlashPoolCandidate {
            address: fx.flash_pool.address(),
            key: fx.flash_pool.key(),
        }],
        None,
    );
    let client = LocalSettlementClient::new(fx.ledger.clone(), fx.executor.clone(), addr(OWNER))
        .with_lender(fx.flash_pool.clone());
    ArbitrageCoordinator::new(
        CoordinatorConfig {
            settlement_contract: contract(),
            mode,
        },
        selector,
        Arc::new(client),
    )
}

#[tokio::test]
async fn test_dry_run_makes_no_transfers() {
    let fx = Fixture::new();
    let coordinator = coordinator(&fx, SendMode::DryRun);
    let path = fx.two_venue_path(&fx.v3_low_fee, &fx.v3_high_fee, U256::from(BORROW + 5));

    let (before, transfers_before) = {
        let ledger = fx.ledger.lock();
        (ledger.balances_snapshot(), ledger.transfers().len())
    };

    let outcome = coordinator
        .execute(&path, PathShape::TwoHop, U256::from(BORROW))
        .await
        .unwrap();

    assert_eq!(outcome.mode, SendMode::DryRun);
    assert!(outcome.tx_hash.is_none());
    assert!(outcome.simulated.has_profit());
    assert!(!outcome.gas_estimate.is_zero());
    assert!(matches!(outcome.request.source, FlashSource::FlashSwapPool { .. }));

    let ledger = fx.ledger.lock();
    assert_eq!(ledger.transfers().len(), transfers_before);
    assert_eq!(ledger.balances_snapshot(), before);
    assert!(ledger.events().is_empty());
}

#[tokio::test]
async fn test_live_mode_submits_after_simulation() {
    let fx = Fixture::new();
    let coordinator = coordinator(&fx, SendMode::Live);
    let path = fx.two_venue_path(&fx.v3_low_fee, &fx.v2_pair, U256::from(BORROW + 5));

    let outcome = coordinator
        .execute(&path, PathShape::General, U256::from(BORROW))
        .await
        .unwrap();

    assert!(outcome.is_submitted());
    assert_eq!(fx.balance(TOKEN_A, addr(TREASURY)), outcome.simulated.tithe_amount);
    assert_eq!(fx.balance(TOKEN_A, addr(OWNER)), outcome.simulated.operator_amount);
}

#[tokio::test]
async fn test_failed_simulation_blocks_submission() {
    let fx = Fixture::new();
    let coordinator = coordinator(&fx, SendMode::Live);
    let losing = fx.two_venue_path(&fx.v2_pair, &fx.v3_low_fee, U256::zero());
    let before = fx.ledger.lock().balances_snapshot();

    let err = coordinator
        .execute(&losing, PathShape::General, U256::from(BORROW))
        .await
        .unwrap_err();

    assert!(matches!(err, ArbitrageError::InsufficientRepayment { .. }));
    assert_eq!(fx.ledger.lock().balances_snapshot(), before);
}

/// 只计数的客户端
#[derive(Default)]
struct CountingClient {
    calls: AtomicUsize,
}

#[async_trait]
impl SettlementClient for CountingClient {
    async fn simulate(&self, _contract: Address, _request: &FlashLoanRequest) -> Result<ProfitSplit, ArbitrageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProfitSplit::default())
    }

    async fn estimate_gas(&self, _contract: Address, _request: &FlashLoanRequest, _hops: usize) -> Result<U256, ArbitrageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(U256::zero())
    }

    async fn submit(&self, _contract: Address, _request: &FlashLoanRequest) -> Result<H256, ArbitrageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(H256::zero())
    }
}

#[tokio::test]
async fn test_missing_settlement_contract_fails_before_any_call() {
    let fx = Fixture::new();
    let client = Arc::new(CountingClient::default());
    let selector = FlashSourceSelector::new(
        vec![FlashPoolCandidate {
            address: fx.flash_pool.address(),
            key: fx.flash_pool.key(),
        }],
        None,
    );
    let path = fx.two_venue_path(&fx.v3_low_fee, &fx.v2_pair, U256::zero());

    for settlement_contract in [None, Some("not-an-address".to_string())] {
        let coordinator = ArbitrageCoordinator::new(
            CoordinatorConfig {
                settlement_contract,
                mode: SendMode::Live,
            },
            selector.clone(),
            client.clone(),
        );
        let err = coordinator
            .execute(&path, PathShape::General, U256::from(BORROW))
            .await
            .unwrap_err();
        assert!(matches!(err, ArbitrageError::Configuration(_)));
    }
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_lending_pool_fallback_when_no_flash_pool_fits() {
    let fx = Fixture::new();
    let selector = FlashSourceSelector::new(vec![], Some((addr(LENDING_POOL), 500)));
    let client = LocalSettlementClient::new(fx.ledger.clone(), fx.executor.clone(), addr(OWNER))
        .with_lender(Arc::new(dex::LendingPool::new(addr(LENDING_POOL), 500)));
    let coordinator = ArbitrageCoordinator::new(
        CoordinatorConfig {
            settlement_contract: contract(),
            mode: SendMode::DryRun,
        },
        selector,
        Arc::new(client),
    );
    let path = fx.two_venue_path(&fx.v3_low_fee, &fx.v2_pair, U256::zero());

    let outcome = coordinator
        .execute(&path, PathShape::General, U256::from(BORROW))
        .await
        .unwrap();
    assert_eq!(outcome.request.lender(), addr(LENDING_POOL));
    assert_eq!(outcome.simulated.fee_paid, U256::from(5u64));
}
