mod pool;
mod arbitrage;
mod flash;
mod payload;
mod profit;
mod events;
mod error;

pub use pool::*;
pub use arbitrage::*;
pub use flash::*;
pub use payload::*;
pub use profit::*;
pub use events::*;
pub use error::*;
