//! Custom token accounting: contract issuance, per-contract balances and gas pricing

pub mod contract;
pub mod gas;
pub mod ledger;

pub use contract::*;
pub use gas::*;
pub use ledger::*;
