use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Uniswap 主网默认合约地址
pub mod defaults {
    pub const QUOTER_V2: &str = "0x61fFE014bA17989E743c5F6cB21bF9697530B21e";
    pub const V2_ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
    pub const V3_FACTORY: &str = "0x1F98431c8aD98523631AE4a59f267346ea31F984";
    pub const V3_INIT_CODE_HASH: &str = "0xe34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54";
    pub const AAVE_V3_POOL: &str = "0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2";
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub wallet: WalletConfig,
    pub monitor: MonitorSettings,
    pub simulator: SimulatorSettings,
    pub flash_loan: FlashLoanSettings,
    pub settlement: SettlementSettings,
    pub dex: DexSettings,
    pub execution: ExecutionSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key: Option<String>,
    /// 结算合约地址；缺失或格式错误时在提交阶段失败，不发起任何网络调用
    pub settlement_contract: Option<String>,
}

/// 单个池配置 (POOL_GROUPS / FLASH_POOLS 中的元素)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PoolConfig {
    pub address: String,
    pub dex_type: String,
    pub token0: String,
    pub token1: String,
    #[serde(default)]
    pub fee: u32,
}

/// 交易同一交易对的场所组
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PoolGroupConfig {
    pub name: String,
    pub borrow_token: String,
    pub pools: Vec<PoolConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    pub pool_groups: Vec<PoolGroupConfig>,
    pub poll_interval_ms: u64,
    /// 价差阈值 (基点)
    pub divergence_threshold_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorSettings {
    /// 借入数量 (借入资产原始单位, 十进制字符串)
    pub borrow_amount: String,
    /// 探测数量, 必须小于 borrow_amount
    pub probe_amount: String,
    pub max_extrapolation_factor: u64,
    pub verify_full_size: bool,
    pub min_profit: String,
    pub estimated_gas_cost: String,
    pub max_slippage_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlashLoanSettings {
    pub flash_pools: Vec<PoolConfig>,
    pub lending_pool: Option<String>,
    /// 借贷池费率 (1e6 基数)
    pub lending_pool_premium: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettlementSettings {
    pub treasury_address: Option<String>,
    pub tithe_percent: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexSettings {
    pub quoter_v2: String,
    pub v2_router: String,
    pub v3_factory: String,
    pub v3_init_code_hash: String,
    pub enabled_dex_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSettings {
    pub dry_run: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // 加载 .env 文件
        dotenv::dotenv().ok();

        let chain = ChainConfig {
            chain_id: env_or("CHAIN_ID", "1")?,
            rpc_url: env::var("RPC_URL").unwrap_or_else(|_| "https://eth.llamarpc.com".to_string()),
        };

        let wallet = WalletConfig {
            private_key: env::var("PRIVATE_KEY").ok().filter(|s| !s.is_empty()),
            settlement_contract: env::var("SETTLEMENT_CONTRACT").ok().filter(|s| !s.is_empty()),
        };

        let monitor = MonitorSettings {
            pool_groups: parse_pool_groups(&env::var("POOL_GROUPS").unwrap_or_else(|_| "[]".to_string()))
                .context("Invalid POOL_GROUPS")?,
            poll_interval_ms: env_or("POLL_INTERVAL_MS", "3000")?,
            divergence_threshold_bps: env_or("DIVERGENCE_THRESHOLD_BPS", "30")?,
        };

        let simulator = SimulatorSettings {
            borrow_amount: env::var("BORROW_AMOUNT").unwrap_or_else(|_| "10000000000000000000".to_string()),
            probe_amount: env::var("PROBE_AMOUNT").unwrap_or_else(|_| "10000000000000000".to_string()),
            max_extrapolation_factor: env_or("MAX_EXTRAPOLATION_FACTOR", "1000")?,
            verify_full_size: env_or("VERIFY_FULL_SIZE", "true")?,
            min_profit: env::var("MIN_PROFIT").unwrap_or_else(|_| "0".to_string()),
            estimated_gas_cost: env::var("ESTIMATED_GAS_COST").unwrap_or_else(|_| "0".to_string()),
            max_slippage_bps: env_or("MAX_SLIPPAGE_BPS", "50")?,
        };

        let flash_loan = FlashLoanSettings {
            flash_pools: parse_pools(&env::var("FLASH_POOLS").unwrap_or_else(|_| "[]".to_string()))
                .context("Invalid FLASH_POOLS")?,
            lending_pool: env::var("LENDING_POOL").ok().filter(|s| !s.is_empty()),
            lending_pool_premium: env_or("LENDING_POOL_PREMIUM", "500")?,
        };

        let settlement = SettlementSettings {
            treasury_address: env::var("TREASURY_ADDRESS").ok().filter(|s| !s.is_empty()),
            tithe_percent: env_or("TITHE_PERCENT", "30")?,
        };

        let dex = DexSettings {
            quoter_v2: env::var("QUOTER_V2").unwrap_or_else(|_| defaults::QUOTER_V2.to_string()),
            v2_router: env::var("V2_ROUTER").unwrap_or_else(|_| defaults::V2_ROUTER.to_string()),
            v3_factory: env::var("V3_FACTORY").unwrap_or_else(|_| defaults::V3_FACTORY.to_string()),
            v3_init_code_hash: env::var("V3_INIT_CODE_HASH")
                .unwrap_or_else(|_| defaults::V3_INIT_CODE_HASH.to_string()),
            enabled_dex_types: parse_list(
                &env::var("ENABLED_DEX_TYPES").unwrap_or_else(|_| "uniswap_v3,uniswap_v2".to_string()),
            ),
        };

        let execution = ExecutionSettings {
            dry_run: env_or("DRY_RUN", "true")?,
        };

        if settlement.tithe_percent > 100 {
            anyhow::bail!("TITHE_PERCENT must be <= 100, got {}", settlement.tithe_percent);
        }

        Ok(Self {
            chain,
            wallet,
            monitor,
            simulator,
            flash_loan,
            settlement,
            dex,
            execution,
        })
    }
}

/// 读取环境变量，缺失时使用默认值，解析失败带上变量名
fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .with_context(|| format!("Invalid {}", key))
}

pub fn parse_pool_groups(raw: &str) -> Result<Vec<PoolGroupConfig>> {
    let groups: Vec<PoolGroupConfig> = serde_json::from_str(raw)?;
    for group in &groups {
        if group.pools.len() < 2 {
            anyhow::bail!("pool group '{}' needs at least 2 pools", group.name);
        }
    }
    Ok(groups)
}

pub fn parse_pools(raw: &str) -> Result<Vec<PoolConfig>> {
    Ok(serde_json::from_str(raw)?)
}

/// 逗号分隔列表
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
