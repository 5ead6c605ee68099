//! 应用启动引导模块
//!
//! 从 AppConfig 组装 监控 → 模拟 → 协调 整条流水线，并管理其生命周期

use anyhow::{Context, Result};
use config_crate::{AppConfig, PoolConfig};
use dex::{v3_addresses, FlashPoolCandidate, FlashSourceSelector, ProtocolSet, UniswapV2Protocol, UniswapV3Protocol};
use ethers::prelude::*;
use ethers::signers::LocalWallet;
use executor::{
    ArbitrageCoordinator, ContractSettlementClient, CoordinatorConfig, FlashArbitrageContract, SendMode,
    SettlementClient,
};
use models::{DexType, Pool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use strategies::{OpportunityMonitor, PoolGroup, PreTradeSimulator, SimulatorConfig, StrategyRunner};
use tracing::{error, info, warn};
use ::utils::{RpcStatsProvider, StatsHttp};

use crate::Cli;

/// 应用程序实例
pub struct Application {
    rpc_stats_provider: RpcStatsProvider,
    runner: Arc<StrategyRunner>,
}

impl Application {
    /// 加载配置并组装流水线
    pub async fn start(cli: &Cli) -> Result<Self> {
        info!("加载配置...");
        let config = AppConfig::load()?;
        let mode = SendMode::from_dry_run(cli.dry_run || config.execution.dry_run);
        Self::log_config(&config, mode);

        info!("初始化以太坊 Provider（带 RPC 统计）...");
        let rpc_stats_provider = RpcStatsProvider::new(&config.chain.rpc_url, 10)?;
        let provider = rpc_stats_provider.provider();

        let wallet = Self::init_wallet(&config)?;
        let protocols = Self::build_protocols(&config, provider.clone())?;
        let groups = Self::build_groups(&config, &protocols)?;
        Self::verify_v2_pairs(&config, provider.clone(), &groups).await?;
        let selector = Self::build_selector(&config)?;
        Self::verify_treasury(&config, provider.clone()).await?;
        let client = Self::build_client(provider, wallet);

        let simulator_config = SimulatorConfig::from_settings(&config.simulator)?;
        let monitor = OpportunityMonitor::new(
            groups,
            protocols.clone(),
            config.monitor.divergence_threshold_bps,
            simulator_config.borrow_amount,
        );
        let simulator = PreTradeSimulator::new(protocols, simulator_config);
        let coordinator = ArbitrageCoordinator::new(
            CoordinatorConfig {
                settlement_contract: config.wallet.settlement_contract.clone(),
                mode,
            },
            selector,
            client,
        );

        let runner = Arc::new(StrategyRunner::new(
            monitor,
            simulator,
            coordinator,
            Duration::from_millis(config.monitor.poll_interval_ms),
            config.simulator.max_slippage_bps,
        ));

        Ok(Self {
            rpc_stats_provider,
            runner,
        })
    }

    /// 持续运行，Ctrl-C 时在当前周期结束后停止
    pub async fn run(&self) {
        let runner = self.runner.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("监听 Ctrl-C 失败: {}", e);
                return;
            }
            info!("收到 Ctrl-C, 等待当前周期结束...");
            runner.stop().await;
        });

        self.runner.run().await;
    }

    /// 只执行一个周期
    pub async fn run_once(&self) {
        let report = self.runner.run_cycle().await;
        info!(
            "周期结束: 机会 {}, 失败池组 {}, 跳过池组 {}, 已提交 {}",
            report.opportunities,
            report.failed_groups,
            report.skipped_groups,
            report.submitted()
        );
        if let Some(e) = report.error {
            warn!("周期错误 [{}]: {}", e.kind(), e);
        }
    }

    pub fn shutdown(mut self) {
        self.rpc_stats_provider.stop();
        info!("系统已停止");
    }

    // ========== 私有辅助方法 ==========

    fn log_config(config: &AppConfig, mode: SendMode) {
        info!("配置加载成功");
        info!("========================================");
        info!("chain_id={} RPC: {}", config.chain.chain_id, config.chain.rpc_url);
        info!("发送模式: {:?}", mode);
        info!("池组数量: {}", config.monitor.pool_groups.len());
        info!("轮询间隔: {}ms", config.monitor.poll_interval_ms);
        info!("价差阈值: {} bps", config.monitor.divergence_threshold_bps);
        info!("借入数量: {}, 探测数量: {}", config.simulator.borrow_amount, config.simulator.probe_amount);
        info!(
            "捐献比例: {}% (仅供核对, 链上比例由结算合约固定), 捐献地址: {:?}",
            config.settlement.tithe_percent, config.settlement.treasury_address
        );
        info!("========================================");
        if config.wallet.settlement_contract.is_none() {
            warn!("⚠️  结算合约未配置 - 提交阶段将失败");
        }
    }

    fn init_wallet(config: &AppConfig) -> Result<Option<LocalWallet>> {
        match &config.wallet.private_key {
            Some(private_key) => {
                let wallet = private_key
                    .parse::<LocalWallet>()
                    .context("Invalid PRIVATE_KEY")?
                    .with_chain_id(config.chain.chain_id);
                info!("✅ 钱包已配置: {:?}", wallet.address());
                Ok(Some(wallet))
            }
            None => {
                warn!("⚠️  钱包私钥未配置 - 只能只读运行");
                Ok(None)
            }
        }
    }

    fn build_protocols(config: &AppConfig, provider: Arc<Provider<StatsHttp>>) -> Result<ProtocolSet> {
        let mut protocols = ProtocolSet::new();
        for name in &config.dex.enabled_dex_types {
            let dex_type = DexType::from_str(name).map_err(anyhow::Error::msg)?;
            match dex_type {
                DexType::UniswapV3 => {
                    let quoter = parse_address(&config.dex.quoter_v2, "QUOTER_V2")?;
                    protocols.register(Arc::new(UniswapV3Protocol::with_quoter(provider.clone(), quoter)));
                }
                DexType::UniswapV2 => {
                    let router = parse_address(&config.dex.v2_router, "V2_ROUTER")?;
                    protocols.register(Arc::new(UniswapV2Protocol::with_router(provider.clone(), router)));
                }
                DexType::Curve => anyhow::bail!("curve 场所暂不支持"),
            }
            info!("✅ 已启用场所: {}", dex_type);
        }
        Ok(protocols)
    }

    fn build_groups(config: &AppConfig, protocols: &ProtocolSet) -> Result<Vec<PoolGroup>> {
        let mut groups = Vec::with_capacity(config.monitor.pool_groups.len());
        for group in &config.monitor.pool_groups {
            let pools = group
                .pools
                .iter()
                .map(parse_pool)
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("池组 {}", group.name))?;
            if let Some(pool) = pools.iter().find(|p| !protocols.is_enabled(p.dex_type)) {
                anyhow::bail!("池组 {} 中的池子 {:?} 使用未启用的场所 {}", group.name, pool.address, pool.dex_type);
            }
            ensure_single_v2(&group.name, &pools)?;
            let borrow_token = parse_address(&group.borrow_token, "borrow_token")?;
            groups.push(PoolGroup::new(group.name.clone(), borrow_token, pools)?);
        }
        if groups.is_empty() {
            warn!("⚠️  未配置任何池组 (POOL_GROUPS)");
        }
        Ok(groups)
    }

    /// 配置了 TREASURY_ADDRESS 时与结算合约的 treasury() 比对
    async fn verify_treasury(config: &AppConfig, provider: Arc<Provider<StatsHttp>>) -> Result<()> {
        let (Some(raw_contract), Some(raw_treasury)) =
            (&config.wallet.settlement_contract, &config.settlement.treasury_address)
        else {
            return Ok(());
        };
        let contract = parse_address(raw_contract, "SETTLEMENT_CONTRACT")?;
        let expected = parse_address(raw_treasury, "TREASURY_ADDRESS")?;

        let onchain = FlashArbitrageContract::new(contract, provider)
            .treasury()
            .call()
            .await
            .context("读取结算合约 treasury() 失败")?;
        check_treasury(expected, onchain)?;
        info!("✅ 捐献地址与结算合约一致: {:?}", onchain);
        Ok(())
    }

    /// V2 报价与执行都经过同一个路由，池组里的 V2 池子必须是路由实际使用的交易对
    async fn verify_v2_pairs(config: &AppConfig, provider: Arc<Provider<StatsHttp>>, groups: &[PoolGroup]) -> Result<()> {
        let v2_pools: Vec<&Pool> = groups
            .iter()
            .flat_map(|g| g.pools.iter())
            .filter(|p| p.dex_type == DexType::UniswapV2)
            .collect();
        if v2_pools.is_empty() {
            return Ok(());
        }

        let router = parse_address(&config.dex.v2_router, "V2_ROUTER")?;
        let protocol = UniswapV2Protocol::with_router(provider, router);
        for pool in v2_pools {
            protocol.verify_pair(pool).await?;
        }
        info!("✅ V2 交易对已与路由核对");
        Ok(())
    }

    /// 闪电兑换池必须是工厂派生的规范地址，否则结算合约的回调校验必然失败
    fn build_selector(config: &AppConfig) -> Result<FlashSourceSelector> {
        let factory = parse_address(&config.dex.v3_factory, "V3_FACTORY")?;
        let init_code_hash = H256::from_str(config.dex.v3_init_code_hash.trim()).context("Invalid V3_INIT_CODE_HASH")?;

        let mut candidates = Vec::with_capacity(config.flash_loan.flash_pools.len());
        for raw in &config.flash_loan.flash_pools {
            let pool = parse_pool(raw).context("Invalid FLASH_POOLS")?;
            let canonical =
                v3_addresses::compute_pool_address(factory, pool.token0, pool.token1, pool.fee, init_code_hash);
            if canonical != pool.address {
                anyhow::bail!(
                    "闪电兑换池 {:?} 不是 ({:?}, {:?}, {}) 的规范地址 {:?}",
                    pool.address,
                    pool.token0,
                    pool.token1,
                    pool.fee,
                    canonical
                );
            }
            candidates.push(FlashPoolCandidate::from(&pool));
        }

        let lending_pool = config
            .flash_loan
            .lending_pool
            .as_deref()
            .map(|raw| parse_address(raw, "LENDING_POOL"))
            .transpose()?
            .map(|pool| (pool, config.flash_loan.lending_pool_premium));

        info!("闪电贷来源: {} 个 V3 池, 借贷池 {:?}", candidates.len(), lending_pool);
        Ok(FlashSourceSelector::new(candidates, lending_pool))
    }

    fn build_client(provider: Arc<Provider<StatsHttp>>, wallet: Option<LocalWallet>) -> Arc<dyn SettlementClient> {
        match wallet {
            Some(wallet) => {
                let address = wallet.address();
                let signer = SignerMiddleware::new((*provider).clone(), wallet);
                Arc::new(ContractSettlementClient::new(Arc::new(signer), Some(address)))
            }
            None => Arc::new(ContractSettlementClient::new(provider, None)),
        }
    }
}

fn parse_address(raw: &str, name: &str) -> Result<Address> {
    Address::from_str(raw.trim()).with_context(|| format!("Invalid {}: {}", name, raw))
}

fn check_treasury(expected: Address, onchain: Address) -> Result<()> {
    if expected != onchain {
        anyhow::bail!("TREASURY_ADDRESS {:?} 与结算合约 treasury() {:?} 不一致", expected, onchain);
    }
    Ok(())
}

/// 只有一个 V2 路由，同一交易对在路由上只对应一个交易对地址
fn ensure_single_v2(group: &str, pools: &[Pool]) -> Result<()> {
    let count = pools.iter().filter(|p| p.dex_type == DexType::UniswapV2).count();
    if count > 1 {
        anyhow::bail!("池组 {} 含 {} 个 V2 池子, 单一 V2 路由只能路由其中一个", group, count);
    }
    Ok(())
}

fn parse_pool(config: &PoolConfig) -> Result<Pool> {
    let dex_type = DexType::from_str(&config.dex_type).map_err(anyhow::Error::msg)?;
    Ok(Pool::new(
        parse_address(&config.address, "pool address")?,
        dex_type,
        parse_address(&config.token0, "token0")?,
        parse_address(&config.token1, "token1")?,
        config.fee,
    ))
}

/// 设置全局 panic hook
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("========================================");
        error!("!!! 系统发生 PANIC !!!");
        error!("========================================");
        if let Some(location) = panic_info.location() {
            error!("发生位置: {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            error!("Panic 消息: {}", s);
        }
        error!("========================================");
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pool_sorts_tokens() {
        let config = PoolConfig {
            address: "0x0000000000000000000000000000000000000010".to_string(),
            dex_type: "uniswap_v2".to_string(),
            token0: "0x0000000000000000000000000000000000000002".to_string(),
            token1: "0x0000000000000000000000000000000000000001".to_string(),
            fee: 3000,
        };
        let pool = parse_pool(&config).unwrap();
        assert_eq!(pool.dex_type, DexType::UniswapV2);
        assert_eq!(pool.token0, Address::from_low_u64_be(1));
    }

    #[test]
    fn test_group_with_two_v2_pairs_rejected() {
        let token = |n| Address::from_low_u64_be(n);
        let v2 = |n| Pool::new(Address::from_low_u64_be(n), DexType::UniswapV2, token(1), token(2), 3000);
        let v3 = Pool::new(token(12), DexType::UniswapV3, token(1), token(2), 500);

        assert!(ensure_single_v2("A/B", &[v2(10), v3.clone()]).is_ok());
        let err = ensure_single_v2("A/B", &[v2(10), v2(11), v3]).unwrap_err();
        assert!(err.to_string().contains("A/B"));
    }

    #[test]
    fn test_treasury_must_match_contract() {
        let treasury = Address::from_low_u64_be(0xE2);
        assert!(check_treasury(treasury, treasury).is_ok());
        let err = check_treasury(treasury, Address::from_low_u64_be(0xE3)).unwrap_err();
        assert!(err.to_string().contains("TREASURY_ADDRESS"));
    }

    #[test]
    fn test_parse_address_names_the_field() {
        let err = parse_address("0x12", "LENDING_POOL").unwrap_err();
        assert!(err.to_string().contains("LENDING_POOL"));
    }
}
