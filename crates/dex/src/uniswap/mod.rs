pub mod v2;
pub mod v3;
pub mod contracts;

pub use v2::UniswapV2Protocol;
pub use v3::UniswapV3Protocol;
pub use contracts::{v2_addresses, v3_addresses};
