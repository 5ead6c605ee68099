//! 套利执行模块
//!
//! ## 模块结构
//!
//! - `settlement`: 闪电贷回调结算状态机
//! - `distributor`: 还款与利润分配
//! - `coordinator`: 请求打包、dry-run / live 提交
//! - `client`: 结算提交客户端 (链上合约)
//! - `local`: 基于内存账本的结算客户端
//! - `flash_arbitrage`: 结算合约 ABI 绑定

mod flash_arbitrage;
mod types;
pub mod settlement;
pub mod distributor;
pub mod coordinator;
pub mod client;
pub mod local;

pub use flash_arbitrage::{split_from_return, FlashArbitrageContract, SettlementReturn};
pub use types::{estimate_arbitrage_gas, CoordinatorOutcome, SendMode};
pub use settlement::{FlashCallbackExecutor, SettlementConfig, SettlementState};
pub use distributor::ProfitDistributor;
pub use coordinator::{parse_settlement_contract, ArbitrageCoordinator, CoordinatorConfig};
pub use client::{ContractSettlementClient, SettlementClient};
pub use local::LocalSettlementClient;
