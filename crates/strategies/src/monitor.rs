//! 机会监控
//!
//! 每个周期并发读取所有池组中每个池子的状态，全部返回后再做判断:
//! - 某个池子读取失败只放弃该池组，同周期其他池组不受影响
//! - 流动性为零的池子本周期跳过 (记日志，不算错误)
//! - 同组池子归一化价格偏离超过阈值时产生一个套利机会

use chrono::Utc;
use dashmap::DashMap;
use dex::ProtocolSet;
use ethers::types::{Address, U256};
use futures_util::future::join_all;
use models::{mul_div, ArbitrageError, ArbitrageOpportunity, Pool, PoolState, TradeDirection};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 交易同一对代币的一组池子
#[derive(Debug, Clone)]
pub struct PoolGroup {
    pub name: String,
    pub borrow_token: Address,
    pub pools: Vec<Pool>,
}

impl PoolGroup {
    /// 校验: 至少两个池子、代币对一致、借入代币属于该代币对
    pub fn new(name: impl Into<String>, borrow_token: Address, pools: Vec<Pool>) -> Result<Self, ArbitrageError> {
        let name = name.into();
        let first = pools
            .first()
            .ok_or_else(|| ArbitrageError::Configuration(format!("池组 {} 为空", name)))?;
        if pools.len() < 2 {
            return Err(ArbitrageError::Configuration(format!("池组 {} 至少需要 2 个池子", name)));
        }
        if pools.iter().any(|p| p.token0 != first.token0 || p.token1 != first.token1) {
            return Err(ArbitrageError::Configuration(format!("池组 {} 的池子交易对不一致", name)));
        }
        if !first.contains_token(borrow_token) {
            return Err(ArbitrageError::Configuration(format!(
                "池组 {} 不包含借入代币 {:?}",
                name, borrow_token
            )));
        }
        Ok(Self {
            name,
            borrow_token,
            pools,
        })
    }
}

/// 一个周期的监控结果
#[derive(Debug, Default)]
pub struct MonitorCycle {
    pub opportunities: Vec<ArbitrageOpportunity>,
    /// 因读取失败放弃的池组
    pub failed_groups: Vec<String>,
    /// 因流动性为零跳过的池组
    pub skipped_groups: Vec<String>,
}

pub struct OpportunityMonitor {
    groups: Vec<PoolGroup>,
    protocols: ProtocolSet,
    threshold_bps: u32,
    /// 用于粗估利润的参考借入数量
    reference_amount: U256,
    cache: DashMap<Address, PoolState>,
}

impl OpportunityMonitor {
    pub fn new(groups: Vec<PoolGroup>, protocols: ProtocolSet, threshold_bps: u32, reference_amount: U256) -> Self {
        Self {
            groups,
            protocols,
            threshold_bps,
            reference_amount,
            cache: DashMap::new(),
        }
    }

    pub fn groups(&self) -> &[PoolGroup] {
        &self.groups
    }

    /// 最近一次读取到的池子状态
    pub fn cached_state(&self, pool: Address) -> Option<PoolState> {
        self.cache.get(&pool).map(|s| s.value().clone())
    }

    /// 执行一个监控周期
    pub async fn scan(&self) -> MonitorCycle {
        let reads = self
            .groups
            .iter()
            .flat_map(|g| g.pools.iter())
            .map(|pool| async move { (pool.address, self.protocols.pool_state(pool).await) });
        let results: HashMap<Address, anyhow::Result<PoolState>> = join_all(reads).await.into_iter().collect();

        for (address, result) in &results {
            if let Ok(state) = result {
                self.cache.insert(*address, state.clone());
            }
        }

        let mut cycle = MonitorCycle::default();
        for group in &self.groups {
            let mut states = Vec::with_capacity(group.pools.len());
            let mut failed = false;
            for pool in &group.pools {
                match results.get(&pool.address) {
                    Some(Ok(state)) => states.push(state),
                    Some(Err(e)) => {
                        warn!(target: "strategy", "[{}] 读取池子 {:?} ({}) 失败: {:#}", group.name, pool.address, pool.dex_type, e);
                        failed = true;
                    }
                    None => failed = true,
                }
            }
            if failed {
                cycle.failed_groups.push(group.name.clone());
                continue;
            }

            match self.evaluate_group(group, &states) {
                GroupVerdict::Opportunity(opportunity) => cycle.opportunities.push(*opportunity),
                GroupVerdict::NoLiquidity => cycle.skipped_groups.push(group.name.clone()),
                GroupVerdict::BelowThreshold => {}
            }
        }

        debug!(
            target: "strategy",
            opportunities = cycle.opportunities.len(),
            failed = cycle.failed_groups.len(),
            skipped = cycle.skipped_groups.len(),
            "监控周期完成"
        );
        cycle
    }

    fn evaluate_group(&self, group: &PoolGroup, states: &[&PoolState]) -> GroupVerdict {
        let live: Vec<&PoolState> = states.iter().copied().filter(|s| s.has_liquidity()).collect();
        if live.len() < 2 {
            info!(target: "strategy", "[{}] 池子流动性为零, 本周期跳过", group.name);
            return GroupVerdict::NoLiquidity;
        }

        let by_price = |a: &&&PoolState, b: &&&PoolState| a.price_signal().total_cmp(&b.price_signal());
        let (Some(high), Some(low)) = (live.iter().max_by(by_price), live.iter().min_by(by_price)) else {
            return GroupVerdict::BelowThreshold;
        };
        let (high_price, low_price) = (high.price_signal(), low.price_signal());
        if low_price.is_nan() || low_price <= 0.0 || !high_price.is_finite() {
            return GroupVerdict::BelowThreshold;
        }

        let spread_bps = ((high_price - low_price) / low_price * 10_000.0).floor();
        if spread_bps <= self.threshold_bps as f64 {
            debug!(target: "strategy", "[{}] 价差 {} bps 未超过阈值 {}", group.name, spread_bps, self.threshold_bps);
            return GroupVerdict::BelowThreshold;
        }
        let spread_bps = spread_bps.min(u32::MAX as f64) as u32;

        // 借入 token0: 在 token0 最贵的池卖出，在最便宜的池买回；借入 token1 相反
        let (start, exit, direction) = if group.borrow_token == high.pool().token0 {
            (*high, *low, TradeDirection::ZeroForOne)
        } else {
            (*low, *high, TradeDirection::OneForZero)
        };
        let start_pool = start.pool().clone();
        let exit_pool = exit.pool().clone();
        let intermediate_token = start_pool.other_token(group.borrow_token).unwrap_or_default();

        let fee_bps = (start_pool.fee + exit_pool.fee) / 100;
        let estimated_profit = mul_div(
            self.reference_amount,
            U256::from(spread_bps.saturating_sub(fee_bps)),
            U256::from(10_000u64),
        )
        .unwrap_or_default();

        let opportunity = ArbitrageOpportunity {
            id: uuid::Uuid::new_v4().to_string(),
            group: group.name.clone(),
            start_price: start.price_signal(),
            exit_price: exit.price_signal(),
            start_pool,
            exit_pool,
            direction,
            borrow_token: group.borrow_token,
            intermediate_token,
            spread_bps,
            estimated_profit,
            created_at: Utc::now(),
        };
        info!(
            target: "arbitrage_opportunity",
            "[{}] 发现价差 {} bps: 起始 {:?} ({}) → 退出 {:?} ({}), 方向 {:?}, 粗估利润 {}",
            group.name,
            spread_bps,
            opportunity.start_pool.address,
            opportunity.start_pool.dex_type,
            opportunity.exit_pool.address,
            opportunity.exit_pool.dex_type,
            direction,
            estimated_profit
        );
        GroupVerdict::Opportunity(Box::new(opportunity))
    }
}

enum GroupVerdict {
    Opportunity(Box<ArbitrageOpportunity>),
    NoLiquidity,
    BelowThreshold,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use dex::DexProtocol;
    use models::{DexType, SwapStep, UniswapV2PoolState};
    use std::sync::Arc;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    /// 按地址返回固定储备的 V2 报价源，储备为 None 时读取失败
    struct FixedReserves(HashMap<Address, Option<(u64, u64)>>);

    #[async_trait]
    impl DexProtocol for FixedReserves {
        fn dex_type(&self) -> DexType {
            DexType::UniswapV2
        }

        async fn get_pool_state(&self, pool: &Pool) -> Result<PoolState> {
            let (r0, r1) = self
                .0
                .get(&pool.address)
                .copied()
                .flatten()
                .ok_or_else(|| anyhow!("rpc timeout"))?;
            Ok(PoolState::UniswapV2(UniswapV2PoolState {
                pool: pool.clone(),
                reserve0: U256::from(r0),
                reserve1: U256::from(r1),
                block_timestamp_last: 0,
            }))
        }

        async fn quote(&self, _step: &SwapStep, _amount_in: U256) -> Result<U256> {
            Err(anyhow!("unused"))
        }
    }

    fn pool(address: u64) -> Pool {
        Pool::new(addr(address), DexType::UniswapV2, addr(1), addr(2), 3000)
    }

    fn monitor(reserves: Vec<(u64, Option<(u64, u64)>)>, groups: Vec<PoolGroup>) -> OpportunityMonitor {
        let map = reserves.into_iter().map(|(a, r)| (addr(a), r)).collect();
        let protocols = ProtocolSet::new().with(Arc::new(FixedReserves(map)));
        OpportunityMonitor::new(groups, protocols, 30, U256::from(1_000_000u64))
    }

    #[tokio::test]
    async fn test_divergence_above_threshold_emits_opportunity() {
        let group = PoolGroup::new("A/B", addr(1), vec![pool(10), pool(11)]).unwrap();
        let monitor = monitor(vec![(10, Some((1000, 2000))), (11, Some((1000, 1800)))], vec![group]);

        let cycle = monitor.scan().await;
        assert_eq!(cycle.opportunities.len(), 1);
        let opp = &cycle.opportunities[0];
        // 借入 token0: 从 token0 最贵的池 (2.0) 开始
        assert_eq!(opp.start_pool.address, addr(10));
        assert_eq!(opp.exit_pool.address, addr(11));
        assert_eq!(opp.direction, TradeDirection::ZeroForOne);
        assert_eq!(opp.intermediate_token, addr(2));
        assert_eq!(opp.spread_bps, 1111);
        assert!(monitor.cached_state(addr(10)).is_some());
    }

    #[tokio::test]
    async fn test_borrowing_token1_starts_at_cheapest_token0() {
        let group = PoolGroup::new("A/B", addr(2), vec![pool(10), pool(11)]).unwrap();
        let monitor = monitor(vec![(10, Some((1000, 2000))), (11, Some((1000, 1800)))], vec![group]);

        let cycle = monitor.scan().await;
        let opp = &cycle.opportunities[0];
        assert_eq!(opp.start_pool.address, addr(11));
        assert_eq!(opp.direction, TradeDirection::OneForZero);
    }

    #[tokio::test]
    async fn test_small_divergence_is_ignored() {
        let group = PoolGroup::new("A/B", addr(1), vec![pool(10), pool(11)]).unwrap();
        let monitor = monitor(vec![(10, Some((10_000, 20_000))), (11, Some((10_000, 20_010)))], vec![group]);

        let cycle = monitor.scan().await;
        assert!(cycle.opportunities.is_empty());
        assert!(cycle.failed_groups.is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_isolated_to_its_group() {
        let broken = PoolGroup::new("broken", addr(1), vec![pool(10), pool(11)]).unwrap();
        let healthy = PoolGroup::new("healthy", addr(1), vec![pool(20), pool(21)]).unwrap();
        let monitor = monitor(
            vec![
                (10, Some((1000, 2000))),
                (11, None),
                (20, Some((1000, 2000))),
                (21, Some((1000, 1800))),
            ],
            vec![broken, healthy],
        );

        let cycle = monitor.scan().await;
        assert_eq!(cycle.failed_groups, vec!["broken".to_string()]);
        assert_eq!(cycle.opportunities.len(), 1);
        assert_eq!(cycle.opportunities[0].group, "healthy");
    }

    #[tokio::test]
    async fn test_zero_liquidity_group_skipped() {
        let group = PoolGroup::new("A/B", addr(1), vec![pool(10), pool(11)]).unwrap();
        let monitor = monitor(vec![(10, Some((1000, 2000))), (11, Some((0, 0)))], vec![group]);

        let cycle = monitor.scan().await;
        assert!(cycle.opportunities.is_empty());
        assert_eq!(cycle.skipped_groups, vec!["A/B".to_string()]);
        assert!(cycle.failed_groups.is_empty());
    }

    #[test]
    fn test_group_validation() {
        assert!(PoolGroup::new("one", addr(1), vec![pool(10)]).is_err());
        assert!(PoolGroup::new("foreign", addr(7), vec![pool(10), pool(11)]).is_err());
        let mismatched = Pool::new(addr(12), DexType::UniswapV2, addr(1), addr(3), 3000);
        assert!(PoolGroup::new("mixed", addr(1), vec![pool(10), mismatched]).is_err());
    }
}
