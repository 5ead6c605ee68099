pub mod lender;
pub mod providers;
pub mod selector;

pub use lender::{FlashBorrower, FlashLender, LendingPool, V3FlashPool};
pub use providers::FlashLoanProvider;
pub use selector::{FlashPoolCandidate, FlashSourceSelection, FlashSourceSelector};
