pub mod uniswap;
pub mod curve;
pub mod common;
pub mod flashloan;
pub mod ledger;
pub mod venues;
pub mod adapters;
pub mod local;

pub use uniswap::{v2_addresses, v3_addresses, UniswapV2Protocol, UniswapV3Protocol};
pub use curve::CurveProtocol;
pub use common::{DexProtocol, ProtocolSet};
pub use flashloan::{
    FlashBorrower, FlashLender, FlashLoanProvider, FlashPoolCandidate, FlashSourceSelection, FlashSourceSelector,
    LendingPool, V3FlashPool,
};
pub use ledger::{LedgerError, SharedLedger, TokenLedger, TransferRecord};
pub use venues::{ConcentratedLiquidityRouter, ConcentratedPool, ConstantProductRouter, ExactInputSingleParams};
pub use adapters::{AdapterSet, AdapterSwap, DexAdapter};
pub use local::LocalDexProtocol;
