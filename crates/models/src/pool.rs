use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// DEX 类型 (场所类型标签)
///
/// 结算合约按此标签选择适配器，链下按此标签选择报价方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DexType {
    /// 集中流动性 (单跳 exactInputSingle)
    UniswapV3,
    /// 恒定乘积 (路径数组, 多跳)
    UniswapV2,
    /// 预留类型，结构上存在但未启用
    Curve,
}

impl DexType {
    pub fn name(&self) -> &'static str {
        match self {
            DexType::UniswapV3 => "Uniswap V3",
            DexType::UniswapV2 => "Uniswap V2",
            DexType::Curve => "Curve",
        }
    }

    /// 编码进回调数据的类型标签
    pub fn as_u8(&self) -> u8 {
        match self {
            DexType::UniswapV2 => 0,
            DexType::UniswapV3 => 1,
            DexType::Curve => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DexType::UniswapV2),
            1 => Some(DexType::UniswapV3),
            2 => Some(DexType::Curve),
            _ => None,
        }
    }

    /// 是否是 V3 类型的 DEX (集中流动性)
    pub fn is_v3_style(&self) -> bool {
        matches!(self, DexType::UniswapV3)
    }

    /// 是否是 V2 类型的 DEX (恒定乘积)
    pub fn is_v2_style(&self) -> bool {
        matches!(self, DexType::UniswapV2)
    }
}

impl fmt::Display for DexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DexType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uniswap_v3" | "v3" => Ok(DexType::UniswapV3),
            "uniswap_v2" | "v2" => Ok(DexType::UniswapV2),
            "curve" => Ok(DexType::Curve),
            other => Err(format!("未知的 DEX 类型: {}", other)),
        }
    }
}

/// 流动性池基础信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub address: Address,
    pub dex_type: DexType,
    pub token0: Address,
    pub token1: Address,
    pub fee: u32,           // 费率 (以 1e6 为基数, 如 3000 = 0.3%)
}

impl Pool {
    pub fn new(address: Address, dex_type: DexType, token_a: Address, token_b: Address, fee: u32) -> Self {
        let (token0, token1) = sort_tokens(token_a, token_b);
        Self {
            address,
            dex_type,
            token0,
            token1,
            fee,
        }
    }

    pub fn contains_token(&self, token: Address) -> bool {
        self.token0 == token || self.token1 == token
    }

    /// 获取交易对中的另一个代币
    pub fn other_token(&self, token: Address) -> Option<Address> {
        if token == self.token0 {
            Some(self.token1)
        } else if token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }
}

/// 按地址排序代币
pub fn sort_tokens(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Uniswap V2 风格的池状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniswapV2PoolState {
    pub pool: Pool,
    pub reserve0: U256,
    pub reserve1: U256,
    pub block_timestamp_last: u32,
}

impl UniswapV2PoolState {
    /// 计算给定输入量的输出量 (包含手续费)
    pub fn get_amount_out(&self, amount_in: U256, zero_for_one: bool) -> U256 {
        let (reserve_in, reserve_out) = if zero_for_one {
            (self.reserve0, self.reserve1)
        } else {
            (self.reserve1, self.reserve0)
        };
        constant_product_amount_out(amount_in, reserve_in, reserve_out)
    }
}

/// Uniswap V2 公式: amountOut = (amountIn * 997 * reserveOut) / (reserveIn * 1000 + amountIn * 997)
pub fn constant_product_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return U256::zero();
    }

    let amount_in_with_fee = amount_in * U256::from(997);
    let numerator = amount_in_with_fee * reserve_out;
    let denominator = reserve_in * U256::from(1000) + amount_in_with_fee;

    numerator / denominator
}

/// Uniswap V3 风格的池状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniswapV3PoolState {
    pub pool: Pool,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub liquidity: u128,
}

impl UniswapV3PoolState {
    /// 从 sqrtPriceX96 计算价格 (token1/token0)
    ///
    /// sqrtPriceX96 为 uint160，超出 u128 范围，先按 limb 转 f64
    pub fn get_price(&self) -> f64 {
        if self.sqrt_price_x96.is_zero() {
            // 未初始化 sqrtPrice 时退回 tick 计算
            return 1.0001_f64.powi(self.tick);
        }
        let sqrt_price = u256_to_f64(self.sqrt_price_x96) / 2_f64.powi(96);
        sqrt_price * sqrt_price
    }
}

/// 通用池状态枚举
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PoolState {
    UniswapV2(UniswapV2PoolState),
    UniswapV3(UniswapV3PoolState),
}

impl PoolState {
    pub fn pool(&self) -> &Pool {
        match self {
            PoolState::UniswapV2(s) => &s.pool,
            PoolState::UniswapV3(s) => &s.pool,
        }
    }

    pub fn dex_type(&self) -> DexType {
        self.pool().dex_type
    }

    /// 流动性是否为零 (任一侧为零都视为无流动性)
    pub fn has_liquidity(&self) -> bool {
        match self {
            PoolState::UniswapV2(s) => !s.reserve0.is_zero() && !s.reserve1.is_zero(),
            PoolState::UniswapV3(s) => s.liquidity > 0,
        }
    }

    /// 归一化价格信号: 1 单位 token0 可换得的 token1 (原始单位)
    ///
    /// 同一交易对的池子 token0/token1 顺序一致，信号可直接比较
    pub fn price_signal(&self) -> f64 {
        match self {
            PoolState::UniswapV2(s) => {
                if s.reserve0.is_zero() {
                    return 0.0;
                }
                u256_to_f64(s.reserve1) / u256_to_f64(s.reserve0)
            }
            PoolState::UniswapV3(s) => s.get_price(),
        }
    }

    /// 获取池子的流动性
    pub fn liquidity(&self) -> Option<u128> {
        match self {
            PoolState::UniswapV3(s) => Some(s.liquidity),
            _ => None,
        }
    }

    /// 获取池子的 tick
    pub fn tick(&self) -> Option<i32> {
        match self {
            PoolState::UniswapV3(s) => Some(s.tick),
            _ => None,
        }
    }
}

/// U256 转 f64 (仅用于价格信号，允许精度损失)
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .enumerate()
        .fold(0.0, |acc, (i, limb)| acc + (*limb as f64) * 2_f64.powi(64 * i as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_pool_sorts_tokens() {
        let pool = Pool::new(addr(100), DexType::UniswapV2, addr(9), addr(3), 3000);
        assert_eq!(pool.token0, addr(3));
        assert_eq!(pool.token1, addr(9));
        assert_eq!(pool.other_token(addr(3)), Some(addr(9)));
        assert_eq!(pool.other_token(addr(4)), None);
    }

    #[test]
    fn test_constant_product_amount_out() {
        // 1000/1000 储备，输入 10 → 9 (含 0.3% 手续费)
        let out = constant_product_amount_out(U256::from(10), U256::from(1000), U256::from(1000));
        assert_eq!(out, U256::from(9));
        assert_eq!(constant_product_amount_out(U256::from(10), U256::zero(), U256::from(1000)), U256::zero());
    }

    #[test]
    fn test_price_signal() {
        let pool = Pool::new(addr(100), DexType::UniswapV2, addr(1), addr(2), 3000);
        let state = PoolState::UniswapV2(UniswapV2PoolState {
            pool,
            reserve0: U256::from(1_000u64),
            reserve1: U256::from(2_000u64),
            block_timestamp_last: 0,
        });
        assert!((state.price_signal() - 2.0).abs() < 1e-12);
        assert!(state.has_liquidity());

        // sqrtPriceX96 = 2^96 → price = 1
        let v3 = PoolState::UniswapV3(UniswapV3PoolState {
            pool: Pool::new(addr(101), DexType::UniswapV3, addr(1), addr(2), 500),
            sqrt_price_x96: U256::from(1u64) << 96,
            tick: 0,
            liquidity: 0,
        });
        assert!((v3.price_signal() - 1.0).abs() < 1e-12);
        assert!(!v3.has_liquidity());
    }

    #[test]
    fn test_dex_type_parse() {
        assert_eq!("uniswap_v3".parse::<DexType>().unwrap(), DexType::UniswapV3);
        assert_eq!("V2".parse::<DexType>().unwrap(), DexType::UniswapV2);
        assert!("balancer".parse::<DexType>().is_err());
        for t in [DexType::UniswapV2, DexType::UniswapV3, DexType::Curve] {
            assert_eq!(DexType::from_u8(t.as_u8()), Some(t));
        }
    }
}
