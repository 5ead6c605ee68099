use ethers::abi::{encode, Token};
use ethers::types::{Address, H256};
use ethers::utils::keccak256;
use std::str::FromStr;

/// CREATE2 地址: keccak256(0xff ++ deployer ++ salt ++ init_code_hash)[12..]
fn create2_address(deployer: Address, salt: [u8; 32], init_code_hash: H256) -> Address {
    let mut data = Vec::with_capacity(85);
    data.push(0xff);
    data.extend_from_slice(deployer.as_bytes());
    data.extend_from_slice(&salt);
    data.extend_from_slice(init_code_hash.as_bytes());

    let hash = keccak256(&data);
    Address::from_slice(&hash[12..])
}

/// Uniswap V2 合约地址 (Ethereum Mainnet)
pub mod v2_addresses {
    use super::*;

    lazy_static::lazy_static! {
        /// Uniswap V2 Router02
        pub static ref ROUTER: Address = Address::from_str("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D").unwrap();
    }
}

/// Uniswap V3 合约地址 (Ethereum Mainnet)
pub mod v3_addresses {
    use super::*;

    lazy_static::lazy_static! {
        /// Uniswap V3 Factory
        pub static ref FACTORY: Address = Address::from_str("0x1F98431c8aD98523631AE4a59f267346ea31F984").unwrap();
        /// Uniswap V3 QuoterV2
        pub static ref QUOTER_V2: Address = Address::from_str("0x61fFE014bA17989E743c5F6cB21bF9697530B21e").unwrap();
        /// Pool init code hash
        pub static ref POOL_INIT_CODE_HASH: H256 =
            H256::from_str("0xe34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54").unwrap();
    }

    /// 计算 V3 池子地址, salt = keccak256(abi.encode(token0, token1, fee))
    ///
    /// 结算回调用它确认调用者确实是 (token0, token1, fee) 对应的池子
    pub fn compute_pool_address(
        factory: Address,
        token_a: Address,
        token_b: Address,
        fee: u32,
        init_code_hash: H256,
    ) -> Address {
        let (t0, t1) = models::sort_tokens(token_a, token_b);

        let salt = keccak256(encode(&[
            Token::Address(t0),
            Token::Address(t1),
            Token::Uint(fee.into()),
        ]));

        create2_address(factory, salt, init_code_hash)
    }
}
