//! 策略运行器
//!
//! 周期串行执行: 监控 → 选价差最大的机会 → 路径 → 模拟 → 协调提交。
//! 一个周期内最多尝试一个机会，周期耗时不足轮询间隔时补足睡眠。

use ethers::types::U256;
use executor::{ArbitrageCoordinator, CoordinatorOutcome};
use models::{ArbitrageError, ArbitrageOpportunity};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::monitor::OpportunityMonitor;
use crate::path_builder::build_two_venue_path;
use crate::simulator::{PreTradeSimulator, SimulationReport};

/// 单个周期的结果
#[derive(Debug, Default)]
pub struct CycleReport {
    pub opportunities: usize,
    pub failed_groups: usize,
    pub skipped_groups: usize,
    /// 本周期尝试的机会
    pub attempted: Option<ArbitrageOpportunity>,
    pub simulation: Option<SimulationReport>,
    pub outcome: Option<CoordinatorOutcome>,
    pub error: Option<ArbitrageError>,
}

impl CycleReport {
    pub fn submitted(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.is_submitted())
    }
}

pub struct StrategyRunner {
    monitor: OpportunityMonitor,
    simulator: PreTradeSimulator,
    coordinator: ArbitrageCoordinator,
    poll_interval: Duration,
    max_slippage_bps: u32,
    running: RwLock<bool>,
}

impl StrategyRunner {
    pub fn new(
        monitor: OpportunityMonitor,
        simulator: PreTradeSimulator,
        coordinator: ArbitrageCoordinator,
        poll_interval: Duration,
        max_slippage_bps: u32,
    ) -> Self {
        Self {
            monitor,
            simulator,
            coordinator,
            poll_interval,
            max_slippage_bps,
            running: RwLock::new(false),
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// 执行一个完整周期
    pub async fn run_cycle(&self) -> CycleReport {
        utils::record_cycle();
        let scan = self.monitor.scan().await;

        let mut report = CycleReport {
            opportunities: scan.opportunities.len(),
            failed_groups: scan.failed_groups.len(),
            skipped_groups: scan.skipped_groups.len(),
            ..Default::default()
        };
        for _ in &scan.opportunities {
            utils::record_opportunity();
        }

        let Some(best) = scan.opportunities.into_iter().max_by_key(|o| o.spread_bps) else {
            debug!(target: "strategy", "本周期没有机会");
            return report;
        };
        let borrow_amount = self.simulator.config().borrow_amount;

        let built = build_two_venue_path(&best, U256::zero());
        report.attempted = Some(best);

        let selection = match self.coordinator.selector().select(&built.path, borrow_amount) {
            Ok(selection) => selection,
            Err(e) => {
                warn!(target: "strategy", "闪电贷来源选择失败: {}", e);
                report.error = Some(e);
                return report;
            }
        };

        let simulation = match self.simulator.simulate(&built.path, selection.source.fee_rate()).await {
            Ok(simulation) => simulation,
            Err(e) => {
                utils::record_simulation_failed();
                report.error = Some(e);
                return report;
            }
        };
        let proceed = simulation.proceed;
        let final_min = simulation.final_min_output(self.max_slippage_bps);
        report.simulation = Some(simulation);
        if !proceed {
            return report;
        }

        let built = built.with_final_min(final_min);
        match self.coordinator.execute(&built.path, built.shape, borrow_amount).await {
            Ok(outcome) => {
                if outcome.is_submitted() {
                    utils::record_submission();
                    info!(target: "arbitrage_execution", "交易已提交: {:?}", outcome.tx_hash);
                }
                report.outcome = Some(outcome);
            }
            Err(e) => {
                if matches!(
                    e,
                    ArbitrageError::Validation(_)
                        | ArbitrageError::SwapExecution { .. }
                        | ArbitrageError::InsufficientRepayment { .. }
                        | ArbitrageError::Settlement(_)
                ) {
                    utils::record_settlement_reverted();
                }
                warn!(target: "arbitrage_execution", "协调失败: {}", e);
                report.error = Some(e);
            }
        }
        report
    }

    /// 持续运行直到 stop 被调用
    pub async fn run(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!(target: "strategy", "策略运行器已在运行");
                return;
            }
            *running = true;
        }
        info!(target: "strategy", "策略运行器启动, 轮询间隔 {:?}", self.poll_interval);

        while self.is_running().await {
            let started = Instant::now();
            let report = self.run_cycle().await;
            // 配置错误每个周期都会重现
            if let Some(e @ ArbitrageError::Configuration(_)) = &report.error {
                error!(target: "strategy", "配置错误, 停止运行: {}", e);
                self.stop().await;
                break;
            }

            let elapsed = started.elapsed();
            if let Some(remaining) = self.poll_interval.checked_sub(elapsed) {
                tokio::time::sleep(remaining).await;
            }
        }
        utils::log_pipeline_stats();
        info!(target: "strategy", "策略运行器已停止");
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}
