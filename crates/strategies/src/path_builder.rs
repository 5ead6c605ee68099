//! 套利路径构建
//!
//! 两场所: 借入代币在起始池换成中间代币，再在退出池换回。
//! 两个场所都是 V3 时编码为 TwoHop，否则为 General。

use ethers::types::{Address, U256};
use models::{ArbitrageError, ArbitrageOpportunity, PathShape, Pool, SwapPath, SwapStep, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPath {
    pub path: SwapPath,
    pub shape: PathShape,
}

impl BuiltPath {
    /// 替换最后一跳的最小输出，中间跳保持 0
    pub fn with_final_min(mut self, min_amount_out: U256) -> Self {
        if let Some(last) = self.path.steps.last_mut() {
            last.min_amount_out = min_amount_out;
        }
        self
    }
}

/// 由机会构建两跳闭环路径
pub fn build_two_venue_path(opportunity: &ArbitrageOpportunity, final_min: U256) -> BuiltPath {
    let borrow = opportunity.borrow_token;
    let mid = opportunity.intermediate_token;
    let steps = vec![
        SwapStep::new(&opportunity.start_pool, borrow, mid, U256::zero()),
        SwapStep::new(&opportunity.exit_pool, mid, borrow, final_min),
    ];
    let path = SwapPath::with_steps(borrow, steps);
    let shape = if path.all_v3() {
        PathShape::TwoHop
    } else {
        PathShape::General
    };
    BuiltPath { path, shape }
}

/// A → B → C → A，三个池都必须是 V3
pub fn build_triangular(borrow_token: Address, pools: [&Pool; 3], final_min: U256) -> Result<BuiltPath, ArbitrageError> {
    let invalid = |reason: String| ArbitrageError::Validation(ValidationError::InvalidPath(reason));

    let mut token = borrow_token;
    let mut steps = Vec::with_capacity(3);
    for (hop, pool) in pools.iter().enumerate() {
        if !pool.dex_type.is_v3_style() {
            return Err(invalid(format!("三角路径第 {} 跳不是 V3 池: {}", hop, pool.dex_type)));
        }
        let next = pool
            .other_token(token)
            .ok_or_else(|| invalid(format!("池子 {:?} 不包含 {:?}", pool.address, token)))?;
        let min = if hop == 2 { final_min } else { U256::zero() };
        steps.push(SwapStep::new(pool, token, next, min));
        token = next;
    }

    let path = SwapPath::with_steps(borrow_token, steps);
    path.validate()?;
    Ok(BuiltPath {
        path,
        shape: PathShape::Triangular,
    })
}
