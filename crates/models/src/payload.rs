//! 闪电贷回调数据编解码
//!
//! 外层信封: `(uint8 shape, (address,address,uint24) poolKey, address borrowToken, uint256 borrowAmount, bytes body)`
//! body 按 shape 解释:
//! - TwoHop:     `(address tokenA, address tokenB, uint24 fee1, uint24 fee2, uint256 amountOutMin)`
//! - Triangular: `(address tokenA, address tokenB, address tokenC, uint24 fee1, uint24 fee2, uint24 fee3, uint256 amountOutMin)`
//! - General:    `((address pool, uint8 dexType, address tokenIn, address tokenOut, uint24 fee, uint256 minAmountOut)[])`
//!
//! 解码后重新编码必须与输入逐字节一致，否则视为格式错误

use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::{DexType, PoolKey, SwapPath, SwapStep, ValidationError};

const UINT24_MAX: u32 = 0x00FF_FFFF;

/// 路径形状标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathShape {
    /// borrowed → intermediate → borrowed (两跳均为集中流动性)
    TwoHop,
    /// A → B → C → A (三跳均为集中流动性)
    Triangular,
    /// 任意场所类型混合的有序路径
    General,
}

impl PathShape {
    pub fn as_u8(&self) -> u8 {
        match self {
            PathShape::TwoHop => 1,
            PathShape::Triangular => 2,
            PathShape::General => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(PathShape::TwoHop),
            2 => Some(PathShape::Triangular),
            3 => Some(PathShape::General),
            _ => None,
        }
    }
}

/// 解码后的路由 (按形状区分的标签联合)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArbitrageRoute {
    TwoHop {
        token_a: Address,
        token_b: Address,
        fee1: u32,
        fee2: u32,
        amount_out_min: U256,
    },
    Triangular {
        token_a: Address,
        token_b: Address,
        token_c: Address,
        fee1: u32,
        fee2: u32,
        fee3: u32,
        amount_out_min: U256,
    },
    General {
        steps: Vec<SwapStep>,
    },
}

impl ArbitrageRoute {
    pub fn shape(&self) -> PathShape {
        match self {
            ArbitrageRoute::TwoHop { .. } => PathShape::TwoHop,
            ArbitrageRoute::Triangular { .. } => PathShape::Triangular,
            ArbitrageRoute::General { .. } => PathShape::General,
        }
    }

    /// 由路径构造指定形状的路由
    ///
    /// 固定形状要求全部为集中流动性场所且跳数匹配，最终最小输出取最后一跳的值
    pub fn from_path(path: &SwapPath, shape: PathShape) -> Result<Self, ValidationError> {
        path.validate()?;
        let steps = &path.steps;
        let final_min = steps.last().map(|s| s.min_amount_out).unwrap_or_default();

        match shape {
            PathShape::TwoHop => {
                if steps.len() != 2 || !path.all_v3() {
                    return Err(ValidationError::InvalidPath(format!(
                        "TwoHop 需要 2 跳集中流动性路径, 实际 {} 跳",
                        steps.len()
                    )));
                }
                Ok(ArbitrageRoute::TwoHop {
                    token_a: steps[0].token_in,
                    token_b: steps[0].token_out,
                    fee1: steps[0].fee,
                    fee2: steps[1].fee,
                    amount_out_min: final_min,
                })
            }
            PathShape::Triangular => {
                if steps.len() != 3 || !path.all_v3() {
                    return Err(ValidationError::InvalidPath(format!(
                        "Triangular 需要 3 跳集中流动性路径, 实际 {} 跳",
                        steps.len()
                    )));
                }
                Ok(ArbitrageRoute::Triangular {
                    token_a: steps[0].token_in,
                    token_b: steps[1].token_in,
                    token_c: steps[2].token_in,
                    fee1: steps[0].fee,
                    fee2: steps[1].fee,
                    fee3: steps[2].fee,
                    amount_out_min: final_min,
                })
            }
            PathShape::General => Ok(ArbitrageRoute::General { steps: steps.clone() }),
        }
    }

    /// 展开为逐跳步骤
    ///
    /// 固定形状只携带 (代币, 费率)，场所地址由 `resolve_pool` 按确定性派生给出；
    /// 中间跳最小输出为 0，仅最后一跳受 amount_out_min 约束
    pub fn to_steps<F>(&self, resolve_pool: F) -> Vec<SwapStep>
    where
        F: Fn(Address, Address, u32) -> Address,
    {
        let v3_step = |token_in: Address, token_out: Address, fee: u32, min: U256| SwapStep {
            pool: resolve_pool(token_in, token_out, fee),
            dex_type: DexType::UniswapV3,
            token_in,
            token_out,
            fee,
            min_amount_out: min,
        };

        match self {
            ArbitrageRoute::TwoHop { token_a, token_b, fee1, fee2, amount_out_min } => vec![
                v3_step(*token_a, *token_b, *fee1, U256::zero()),
                v3_step(*token_b, *token_a, *fee2, *amount_out_min),
            ],
            ArbitrageRoute::Triangular { token_a, token_b, token_c, fee1, fee2, fee3, amount_out_min } => vec![
                v3_step(*token_a, *token_b, *fee1, U256::zero()),
                v3_step(*token_b, *token_c, *fee2, U256::zero()),
                v3_step(*token_c, *token_a, *fee3, *amount_out_min),
            ],
            ArbitrageRoute::General { steps } => steps.clone(),
        }
    }

    fn body_types(shape: PathShape) -> Vec<ParamType> {
        match shape {
            PathShape::TwoHop => vec![
                ParamType::Address,
                ParamType::Address,
                ParamType::Uint(24),
                ParamType::Uint(24),
                ParamType::Uint(256),
            ],
            PathShape::Triangular => vec![
                ParamType::Address,
                ParamType::Address,
                ParamType::Address,
                ParamType::Uint(24),
                ParamType::Uint(24),
                ParamType::Uint(24),
                ParamType::Uint(256),
            ],
            PathShape::General => vec![ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Uint(8),
                ParamType::Address,
                ParamType::Address,
                ParamType::Uint(24),
                ParamType::Uint(256),
            ])))],
        }
    }

    fn body_tokens(&self) -> Vec<Token> {
        match self {
            ArbitrageRoute::TwoHop { token_a, token_b, fee1, fee2, amount_out_min } => vec![
                Token::Address(*token_a),
                Token::Address(*token_b),
                Token::Uint(U256::from(*fee1)),
                Token::Uint(U256::from(*fee2)),
                Token::Uint(*amount_out_min),
            ],
            ArbitrageRoute::Triangular { token_a, token_b, token_c, fee1, fee2, fee3, amount_out_min } => vec![
                Token::Address(*token_a),
                Token::Address(*token_b),
                Token::Address(*token_c),
                Token::Uint(U256::from(*fee1)),
                Token::Uint(U256::from(*fee2)),
                Token::Uint(U256::from(*fee3)),
                Token::Uint(*amount_out_min),
            ],
            ArbitrageRoute::General { steps } => vec![Token::Array(
                steps
                    .iter()
                    .map(|s| {
                        Token::Tuple(vec![
                            Token::Address(s.pool),
                            Token::Uint(U256::from(s.dex_type.as_u8())),
                            Token::Address(s.token_in),
                            Token::Address(s.token_out),
                            Token::Uint(U256::from(s.fee)),
                            Token::Uint(s.min_amount_out),
                        ])
                    })
                    .collect(),
            )],
        }
    }

    fn from_body_tokens(shape: PathShape, tokens: Vec<Token>) -> Result<Self, ValidationError> {
        let mut it = tokens.into_iter();
        match shape {
            PathShape::TwoHop => Ok(ArbitrageRoute::TwoHop {
                token_a: take_address(&mut it)?,
                token_b: take_address(&mut it)?,
                fee1: take_uint24(&mut it)?,
                fee2: take_uint24(&mut it)?,
                amount_out_min: take_uint(&mut it)?,
            }),
            PathShape::Triangular => Ok(ArbitrageRoute::Triangular {
                token_a: take_address(&mut it)?,
                token_b: take_address(&mut it)?,
                token_c: take_address(&mut it)?,
                fee1: take_uint24(&mut it)?,
                fee2: take_uint24(&mut it)?,
                fee3: take_uint24(&mut it)?,
                amount_out_min: take_uint(&mut it)?,
            }),
            PathShape::General => {
                let entries = match it.next() {
                    Some(Token::Array(entries)) => entries,
                    _ => return Err(malformed("General body 不是数组")),
                };
                let mut steps = Vec::with_capacity(entries.len());
                for entry in entries {
                    let fields = match entry {
                        Token::Tuple(fields) => fields,
                        _ => return Err(malformed("General 步骤不是元组")),
                    };
                    let mut f = fields.into_iter();
                    let pool = take_address(&mut f)?;
                    let tag = take_uint(&mut f)?;
                    let dex_type = Some(tag)
                        .filter(|t| *t <= U256::from(u8::MAX))
                        .and_then(|t| DexType::from_u8(t.low_u64() as u8))
                        .ok_or_else(|| malformed(&format!("未知的场所类型标签 {}", tag)))?;
                    steps.push(SwapStep {
                        pool,
                        dex_type,
                        token_in: take_address(&mut f)?,
                        token_out: take_address(&mut f)?,
                        fee: take_uint24(&mut f)?,
                        min_amount_out: take_uint(&mut f)?,
                    });
                }
                Ok(ArbitrageRoute::General { steps })
            }
        }
    }
}

/// 回调数据 (信封 + 路由)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    /// 闪电兑换池的身份键；借贷池来源时为空
    pub pool_key: PoolKey,
    pub borrow_token: Address,
    pub borrow_amount: U256,
    pub route: ArbitrageRoute,
}

impl CallbackPayload {
    pub fn new(pool_key: PoolKey, borrow_token: Address, borrow_amount: U256, route: ArbitrageRoute) -> Self {
        Self {
            pool_key,
            borrow_token,
            borrow_amount,
            route,
        }
    }

    pub fn shape(&self) -> PathShape {
        self.route.shape()
    }

    pub fn encode(&self) -> Bytes {
        let body = encode(&self.route.body_tokens());
        encode(&[
            Token::Uint(U256::from(self.shape().as_u8())),
            Token::Tuple(vec![
                Token::Address(self.pool_key.token0),
                Token::Address(self.pool_key.token1),
                Token::Uint(U256::from(self.pool_key.fee)),
            ]),
            Token::Address(self.borrow_token),
            Token::Uint(self.borrow_amount),
            Token::Bytes(body),
        ])
        .into()
    }

    /// 解码回调数据
    ///
    /// 先检查形状标签再解释 body，未知标签与任何字段不匹配都是致命错误
    pub fn decode(data: &[u8]) -> Result<Self, ValidationError> {
        let envelope_types = [
            ParamType::Uint(8),
            ParamType::Tuple(vec![ParamType::Address, ParamType::Address, ParamType::Uint(24)]),
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::Bytes,
        ];
        let tokens = decode(&envelope_types, data).map_err(|e| malformed(&format!("信封解码失败: {}", e)))?;
        if encode(&tokens) != data {
            return Err(malformed("信封长度或字段宽度不匹配"));
        }

        let mut it = tokens.into_iter();
        let tag = take_uint(&mut it)?;
        if tag > U256::from(u8::MAX) {
            return Err(malformed("形状标签超出 uint8"));
        }
        let tag = tag.low_u64() as u8;
        let shape = PathShape::from_u8(tag).ok_or(ValidationError::UnknownPathShape(tag))?;

        let pool_key = match it.next() {
            Some(Token::Tuple(fields)) => {
                let mut f = fields.into_iter();
                PoolKey {
                    token0: take_address(&mut f)?,
                    token1: take_address(&mut f)?,
                    fee: take_uint24(&mut f)?,
                }
            }
            _ => return Err(malformed("poolKey 不是元组")),
        };
        let borrow_token = take_address(&mut it)?;
        let borrow_amount = take_uint(&mut it)?;
        let body = match it.next() {
            Some(Token::Bytes(body)) => body,
            _ => return Err(malformed("body 不是 bytes")),
        };

        let body_tokens = decode(&ArbitrageRoute::body_types(shape), &body)
            .map_err(|e| malformed(&format!("{:?} body 解码失败: {}", shape, e)))?;
        if encode(&body_tokens) != body {
            return Err(malformed(&format!("{:?} body 与形状不匹配", shape)));
        }
        let route = ArbitrageRoute::from_body_tokens(shape, body_tokens)?;

        Ok(Self {
            pool_key,
            borrow_token,
            borrow_amount,
            route,
        })
    }
}

fn malformed(reason: &str) -> ValidationError {
    ValidationError::MalformedPayload(reason.to_string())
}

fn take_address(it: &mut impl Iterator<Item = Token>) -> Result<Address, ValidationError> {
    match it.next() {
        Some(Token::Address(a)) => Ok(a),
        other => Err(malformed(&format!("期望 address, 实际 {:?}", other))),
    }
}

fn take_uint(it: &mut impl Iterator<Item = Token>) -> Result<U256, ValidationError> {
    match it.next() {
        Some(Token::Uint(v)) => Ok(v),
        other => Err(malformed(&format!("期望 uint, 实际 {:?}", other))),
    }
}

fn take_uint24(it: &mut impl Iterator<Item = Token>) -> Result<u32, ValidationError> {
    let v = take_uint(it)?;
    if v > U256::from(UINT24_MAX) {
        return Err(malformed(&format!("费率 {} 超出 uint24", v)));
    }
    Ok(v.low_u32())
}
