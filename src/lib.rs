//! PSNChain - A single-process ledger with proof-of-work sealing, custom tokens
//! and a constant-product market maker
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the chain, replayed balances and admission checks
//! - [`transaction`] - Transaction types, canonical hashing and stateless validation
//! - [`mempool`] - FIFO pool of admitted transactions
//! - [`miner`] - Cancelable proof-of-work sealing
//!
//! ## Token Economy
//! - [`token`] - Contract issuance, per-contract balances and gas pricing
//! - [`amm`] - Liquidity pools and constant-product swaps
//!
//! ## Cryptography
//! - [`crypto`] - Addresses, secp256k1 key pairs and signature checks
//! - [`wallet`] - Key generation and payload signing
//!
//! ## State Management
//! - [`ledger`] - The single-writer state object tying chain, tokens and pools together
//! - [`persistence`] - Database layer (SQLite) and in-memory store
//! - [`cache`] - Caching utilities
//!
//! ## Runtime & Utilities
//! - [`node`] - Async owner of the ledger with a sealing worker
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

/// Fixed-point amount used for balances, fees and pool reserves.
pub type Amount = fixed::types::U64F64;

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod miner;
pub mod transaction;

// ============================================================================
// Token Economy
// ============================================================================
pub mod amm;
pub mod token;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;
pub mod wallet;

// ============================================================================
// State Management
// ============================================================================
pub mod cache;
pub mod ledger;
pub mod persistence;

// ============================================================================
// Runtime & Utilities
// ============================================================================
pub mod config;
pub mod error;
pub mod node;
