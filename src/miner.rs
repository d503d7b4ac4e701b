//! Proof-of-work sealing with cooperative cancellation

use crate::blockchain::Block;
use crate::error::{ChainError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Difficulty is counted in hex digits of a 64-digit SHA-256 hash.
pub const MAX_DIFFICULTY: u32 = 64;

/// How many nonces are tried between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Shared flag a caller flips to stop an in-flight seal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// True when both handles flip the same flag.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// True when `hash` starts with `difficulty` zero hex digits.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Increments the nonce until the block hash meets `difficulty`.
///
/// The block is consumed; a cancelled seal returns [`ChainError::SealingCancelled`]
/// and the partially sealed block is dropped.
pub fn seal_block(mut block: Block, difficulty: u32, cancel: &CancelToken) -> Result<Block> {
    if difficulty > MAX_DIFFICULTY {
        return Err(ChainError::Validation(format!(
            "Difficulty {} exceeds the maximum of {}",
            difficulty, MAX_DIFFICULTY
        )));
    }

    block.nonce = 0;
    block.hash = block.calculate_hash();

    while !meets_difficulty(&block.hash, difficulty) {
        if block.nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            debug!(
                "Sealing of block {} cancelled at nonce {}",
                block.index, block.nonce
            );
            return Err(ChainError::SealingCancelled);
        }
        block.nonce = block.nonce.checked_add(1).ok_or_else(|| {
            ChainError::Validation(format!("Nonce space exhausted for block {}", block.index))
        })?;
        block.hash = block.calculate_hash();
    }

    info!(
        "Sealed block {} with nonce {} (difficulty {}): {}",
        block.index, block.nonce, difficulty, block.hash
    );
    Ok(block)
}
