// Thin re-export module: implementation lives in `blockchain/core.rs`, split into
// block and chain management, persisted chain state and transaction admission.

pub mod core;
pub use core::*;
