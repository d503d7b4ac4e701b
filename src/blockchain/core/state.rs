use crate::crypto::Address;
use crate::transaction::Transaction;
use crate::Amount;
use serde::{Deserialize, Serialize};

use super::chain::Block;

/// Initial supply minted to one address in the genesis block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: Address,
    pub amount: Amount,
}

/// Everything needed to rebuild a [`super::chain::Blockchain`] from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    pub blocks: Vec<Block>,
    pub pending: Vec<Transaction>,
    pub difficulty: u32,
    pub mining_reward: Amount,
    #[serde(default)]
    pub genesis: Option<GenesisAllocation>,
}

impl ChainState {
    pub fn height(&self) -> u64 {
        self.blocks.last().map_or(0, |b| b.index)
    }

    pub fn tip_hash(&self) -> Option<&str> {
        self.blocks.last().map(|b| b.hash.as_str())
    }
}
