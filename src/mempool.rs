//! FIFO pool of admitted transactions awaiting a block

use crate::crypto::Address;
use crate::error::ChainError;
use crate::token::ContractAddress;
use crate::transaction::Transaction;
use crate::Amount;
use std::collections::{HashSet, VecDeque};

/// Maximum number of pending transactions
pub const MAX_MEMPOOL_SIZE: usize = 10_000;

#[derive(Debug, Clone, Default)]
pub struct Mempool {
    queue: VecDeque<Transaction>,
    hashes: HashSet<String>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a pool from persisted transactions, preserving their order.
    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        let mut pool = Mempool::new();
        for tx in transactions {
            if pool.hashes.insert(tx.tx_hash.clone()) {
                pool.queue.push_back(tx);
            }
        }
        pool
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        if self.queue.len() >= MAX_MEMPOOL_SIZE {
            return Err(ChainError::MempoolFull);
        }
        if self.hashes.contains(&tx.tx_hash) {
            return Err(ChainError::DuplicateResource {
                kind: "transaction",
                id: tx.tx_hash,
            });
        }
        self.hashes.insert(tx.tx_hash.clone());
        self.queue.push_back(tx);
        Ok(())
    }

    pub fn contains(&self, tx_hash: &str) -> bool {
        self.hashes.contains(tx_hash)
    }

    pub fn get_transaction(&self, tx_hash: &str) -> Option<&Transaction> {
        if !self.contains(tx_hash) {
            return None;
        }
        self.queue.iter().find(|tx| tx.tx_hash == tx_hash)
    }

    pub fn remove_transaction(&mut self, tx_hash: &str) -> Option<Transaction> {
        if !self.hashes.remove(tx_hash) {
            return None;
        }
        let position = self.queue.iter().position(|tx| tx.tx_hash == tx_hash)?;
        self.queue.remove(position)
    }

    /// Drops every transaction that a sealed block has included.
    pub fn remove_included(&mut self, included: &[Transaction]) {
        let sealed: HashSet<&str> = included.iter().map(|tx| tx.tx_hash.as_str()).collect();
        self.queue.retain(|tx| !sealed.contains(tx.tx_hash.as_str()));
        self.hashes.retain(|hash| !sealed.contains(hash.as_str()));
    }

    /// Native currency (amounts plus gas) already promised by `sender` in pending transactions.
    pub fn pending_native_outgoing(&self, sender: &Address) -> Amount {
        self.from_sender(sender)
            .filter_map(Transaction::native_cost)
            .fold(Amount::ZERO, |acc, cost| acc.saturating_add(cost))
    }

    /// Token amount already promised by `sender` in pending transfers of `contract`.
    pub fn pending_token_outgoing(&self, sender: &Address, contract: &ContractAddress) -> Amount {
        self.from_sender(sender)
            .filter(|tx| tx.token_contract.as_ref() == Some(contract))
            .fold(Amount::ZERO, |acc, tx| acc.saturating_add(tx.amount))
    }

    fn from_sender<'a>(&'a self, sender: &'a Address) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.queue
            .iter()
            .filter(move |tx| tx.sender.as_ref() == Some(sender))
    }

    /// Pending transactions in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.queue.iter()
    }

    pub fn snapshot(&self) -> Vec<Transaction> {
        self.queue.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.hashes.clear();
    }
}
