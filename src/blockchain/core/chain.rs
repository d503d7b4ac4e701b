use crate::crypto::Address;
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::miner::{meets_difficulty, seal_block, CancelToken, MAX_DIFFICULTY};
use crate::token::TokenLedger;
use crate::transaction::{now_millis, Transaction};
use crate::Amount;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::state::{ChainState, GenesisAllocation};
use super::validation::admit_transaction;

/// Fixed genesis timestamp (2023-01-01T00:00:00Z) so genesis is reproducible.
pub const GENESIS_TIMESTAMP: u64 = 1672531200000;
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Unsealed block with `nonce = 0` and a provisional hash.
    pub fn new(index: u64, timestamp: u64, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// SHA-256 over index, previous hash, timestamp, the serialized transactions and the nonce.
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.previous_hash.as_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(serde_json::to_vec(&self.transactions).unwrap_or_default());
        hasher.update(self.nonce.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// The mining reward transaction: the final, sender-less transaction of a non-genesis block.
    pub fn reward_transaction(&self) -> Option<&Transaction> {
        if self.is_genesis() {
            return None;
        }
        self.transactions.last().filter(|tx| tx.is_mint())
    }

    /// Address that collects this block's reward and gas fees.
    pub fn reward_recipient(&self) -> Option<&Address> {
        self.reward_transaction().map(|tx| &tx.recipient)
    }

    pub fn total_gas_fees(&self) -> Amount {
        self.transactions
            .iter()
            .fold(Amount::ZERO, |acc, tx| acc.saturating_add(tx.gas_fee))
    }
}

/// A sealed transaction together with where it sits in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub block_index: u64,
    pub block_hash: String,
    pub block_timestamp: u64,
    pub confirmations: u64,
}

#[derive(Debug, Clone)]
pub struct Blockchain {
    pub blocks: Vec<Block>,
    pub difficulty: u32,
    pub mining_reward: Amount,
    pub mempool: Mempool,
    pub genesis: Option<GenesisAllocation>,
}

impl Blockchain {
    pub fn new(difficulty: u32, mining_reward: Amount, genesis: Option<GenesisAllocation>) -> Result<Self> {
        check_difficulty(difficulty)?;
        check_reward(mining_reward)?;
        if let Some(allocation) = &genesis {
            if allocation.amount == Amount::ZERO {
                return Err(ChainError::Validation(
                    "Genesis allocation must be greater than zero".to_string(),
                ));
            }
        }

        let genesis_block = Self::create_genesis(genesis.as_ref());
        info!("Created genesis block {}", genesis_block.hash);

        Ok(Blockchain {
            blocks: vec![genesis_block],
            difficulty,
            mining_reward,
            mempool: Mempool::new(),
            genesis,
        })
    }

    /// Deterministic genesis block, optionally minting an initial allocation.
    pub fn create_genesis(allocation: Option<&GenesisAllocation>) -> Block {
        let transactions = allocation
            .map(|a| vec![Transaction::mint(a.address.clone(), a.amount, GENESIS_TIMESTAMP)])
            .unwrap_or_default();
        Block::new(0, GENESIS_TIMESTAMP, transactions, GENESIS_PREVIOUS_HASH.to_string())
    }

    pub fn from_state(state: ChainState) -> Self {
        Blockchain {
            blocks: state.blocks,
            difficulty: state.difficulty,
            mining_reward: state.mining_reward,
            mempool: Mempool::from_transactions(state.pending),
            genesis: state.genesis,
        }
    }

    pub fn to_state(&self) -> ChainState {
        ChainState {
            blocks: self.blocks.clone(),
            pending: self.mempool.snapshot(),
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
            genesis: self.genesis.clone(),
        }
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    fn tip(&self) -> Result<&Block> {
        self.blocks.last().ok_or_else(|| ChainError::ChainIntegrity {
            index: 0,
            reason: "Chain has no genesis block".to_string(),
        })
    }

    pub fn height(&self) -> u64 {
        self.blocks.last().map_or(0, |b| b.index)
    }

    pub fn set_difficulty(&mut self, difficulty: u32) -> Result<()> {
        check_difficulty(difficulty)?;
        self.difficulty = difficulty;
        Ok(())
    }

    pub fn set_mining_reward(&mut self, reward: Amount) -> Result<()> {
        check_reward(reward)?;
        self.mining_reward = reward;
        Ok(())
    }

    /// Admits a transaction into the pending pool after full validation.
    pub fn create_transaction(&mut self, tokens: &TokenLedger, tx: Transaction) -> Result<String> {
        admit_transaction(self, tokens, tx)
    }

    /// Unsealed next block: every pending transaction plus the reward, in that order.
    pub fn candidate_block(&self, reward_recipient: &Address) -> Result<Block> {
        let tip = self.tip()?;
        let timestamp = now_millis().max(tip.timestamp);
        let mut transactions = self.mempool.snapshot();
        transactions.push(Transaction::mint(
            reward_recipient.clone(),
            self.mining_reward,
            timestamp,
        ));
        Ok(Block::new(tip.index + 1, timestamp, transactions, tip.hash.clone()))
    }

    /// Links a sealed block onto the tip and drops its transactions from the pool.
    ///
    /// Only native-currency effects are checked here; token movements are applied
    /// by [`crate::ledger::Ledger`] in the same step.
    pub fn commit_block(&mut self, block: Block) -> Result<()> {
        let tip = self.tip()?;
        if block.index != tip.index + 1 || block.previous_hash != tip.hash {
            warn!(
                "Rejecting stale block {} (parent {}), tip is {} ({})",
                block.index, block.previous_hash, tip.index, tip.hash
            );
            return Err(ChainError::StaleCandidate(format!(
                "block {} builds on {}, but the tip is block {} ({})",
                block.index, block.previous_hash, tip.index, tip.hash
            )));
        }

        if block.hash != block.calculate_hash() {
            return Err(ChainError::Validation(format!(
                "Block {} hash does not match its contents",
                block.index
            )));
        }
        if !meets_difficulty(&block.hash, self.difficulty) {
            return Err(ChainError::Validation(format!(
                "Block {} hash {} does not meet difficulty {}",
                block.index, block.hash, self.difficulty
            )));
        }

        let reward = block.reward_transaction().ok_or_else(|| {
            ChainError::Validation(format!(
                "Block {} must end with a reward transaction",
                block.index
            ))
        })?;
        reward.validate_mint()?;
        if reward.amount != self.mining_reward {
            return Err(ChainError::StaleCandidate(format!(
                "reward {} no longer matches the mining reward {}",
                reward.amount, self.mining_reward
            )));
        }

        let body = &block.transactions[..block.transactions.len() - 1];
        let mut outgoing: HashMap<&Address, Amount> = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for tx in body {
            if tx.is_mint() {
                return Err(ChainError::Validation(format!(
                    "Block {} contains a mint transaction before its reward",
                    block.index
                )));
            }
            tx.validate()?;
            if !seen.insert(tx.tx_hash.as_str()) || self.contains_transaction(&tx.tx_hash) {
                return Err(ChainError::DuplicateResource {
                    kind: "transaction",
                    id: tx.tx_hash.clone(),
                });
            }
            if let Some(sender) = &tx.sender {
                let cost = tx.native_cost().ok_or_else(|| {
                    ChainError::Validation(format!("Cost overflow in transaction {}", tx.tx_hash))
                })?;
                let total = outgoing.entry(sender).or_insert(Amount::ZERO);
                *total = total.saturating_add(cost);
            }
        }

        for (sender, required) in &outgoing {
            let available = self.balance_of(sender);
            if available < *required {
                return Err(ChainError::InsufficientBalance {
                    available,
                    required: *required,
                });
            }
        }

        self.mempool.remove_included(&block.transactions);
        info!(
            "Committed block {} with {} transactions: {}",
            block.index,
            block.transactions.len(),
            block.hash
        );
        self.blocks.push(block);
        Ok(())
    }

    /// Builds, seals and commits the next block from the pending pool.
    pub fn append_block(&mut self, reward_recipient: &Address, cancel: &CancelToken) -> Result<Block> {
        let candidate = self.candidate_block(reward_recipient)?;
        let sealed = seal_block(candidate, self.difficulty, cancel)?;
        self.commit_block(sealed.clone())?;
        Ok(sealed)
    }

    /// Native balance from a full replay of the chain. Pending transactions do not count.
    pub fn balance_of(&self, address: &Address) -> Amount {
        let mut credits = Amount::ZERO;
        let mut debits = Amount::ZERO;

        for block in &self.blocks {
            for tx in &block.transactions {
                if tx.sender.as_ref() == Some(address) {
                    debits = debits.saturating_add(tx.native_cost().unwrap_or(Amount::MAX));
                }
                if &tx.recipient == address && !tx.is_token_transfer() {
                    credits = credits.saturating_add(tx.amount);
                }
            }
            if block.reward_recipient() == Some(address) {
                credits = credits.saturating_add(block.total_gas_fees());
            }
        }

        match credits.checked_sub(debits) {
            Some(balance) => balance,
            None => {
                debug_assert!(false, "replayed balance of {} went negative", address);
                warn!(
                    "Replayed balance of {} is negative (credits {}, debits {}); reporting zero",
                    address, credits, debits
                );
                Amount::ZERO
            }
        }
    }

    /// Every address that appears as a sender or recipient.
    pub fn known_addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self
            .blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .flat_map(|tx| tx.sender.iter().chain(std::iter::once(&tx.recipient)))
            .cloned()
            .collect();
        addresses.sort();
        addresses.dedup();
        addresses
    }

    pub fn contains_transaction(&self, tx_hash: &str) -> bool {
        self.transaction_by_hash(tx_hash).is_some()
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash == hash)
    }

    pub fn block_by_index(&self, index: u64) -> Option<&Block> {
        self.blocks.get(usize::try_from(index).ok()?)
    }

    pub fn transaction_by_hash(&self, tx_hash: &str) -> Option<TransactionRecord> {
        self.blocks.iter().find_map(|block| {
            block
                .transactions
                .iter()
                .find(|tx| tx.tx_hash == tx_hash)
                .map(|tx| self.record(block, tx))
        })
    }

    /// Sealed transactions sent or received by `address`, newest first.
    pub fn transactions_for(&self, address: &Address) -> Vec<TransactionRecord> {
        let mut records: Vec<TransactionRecord> = self
            .blocks
            .iter()
            .flat_map(|block| {
                block
                    .transactions
                    .iter()
                    .filter(|tx| tx.sender.as_ref() == Some(address) || &tx.recipient == address)
                    .map(move |tx| (block, tx))
            })
            .map(|(block, tx)| self.record(block, tx))
            .collect();
        records.reverse();
        records
    }

    fn record(&self, block: &Block, tx: &Transaction) -> TransactionRecord {
        TransactionRecord {
            transaction: tx.clone(),
            block_index: block.index,
            block_hash: block.hash.clone(),
            block_timestamp: block.timestamp,
            confirmations: self.height().saturating_sub(block.index) + 1,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate_chain().is_ok()
    }

    /// Recomputes genesis, every link and every hash. Reports the first mismatch.
    pub fn validate_chain(&self) -> Result<()> {
        let genesis = self.blocks.first().ok_or_else(|| ChainError::ChainIntegrity {
            index: 0,
            reason: "Chain has no genesis block".to_string(),
        })?;
        if *genesis != Self::create_genesis(self.genesis.as_ref()) {
            return Err(integrity(0, "genesis block does not match the expected genesis"));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut balances: HashMap<&Address, Amount> = HashMap::new();
        if let Some(allocation) = genesis.transactions.first() {
            balances.insert(&allocation.recipient, allocation.amount);
        }

        for (position, pair) in self.blocks.windows(2).enumerate() {
            let (previous, block) = (&pair[0], &pair[1]);
            let expected_index = position as u64 + 1;

            if block.index != expected_index {
                return Err(integrity(expected_index, &format!("unexpected index {}", block.index)));
            }
            if block.previous_hash != previous.hash {
                return Err(integrity(block.index, "previous hash does not link to the prior block"));
            }
            if block.hash != block.calculate_hash() {
                return Err(integrity(block.index, "stored hash does not match recomputed hash"));
            }

            let reward = block
                .reward_transaction()
                .ok_or_else(|| integrity(block.index, "block does not end with a reward"))?;
            reward
                .validate_mint()
                .map_err(|e| integrity(block.index, &e.to_string()))?;

            let body = &block.transactions[..block.transactions.len() - 1];
            for tx in body {
                if tx.is_mint() {
                    return Err(integrity(block.index, "mint transaction outside the reward slot"));
                }
                // Rewards are unsigned and may repeat; signed transfers may not.
                if !seen.insert(tx.tx_hash.as_str()) {
                    return Err(integrity(
                        block.index,
                        &format!("transaction {} appears more than once", tx.tx_hash),
                    ));
                }
                tx.validate()
                    .map_err(|e| integrity(block.index, &format!("transaction {}: {}", tx.tx_hash, e)))?;

                if let Some(sender) = &tx.sender {
                    let cost = tx.native_cost().unwrap_or(Amount::MAX);
                    let balance = balances.entry(sender).or_insert(Amount::ZERO);
                    *balance = balance.checked_sub(cost).ok_or_else(|| {
                        integrity(
                            block.index,
                            &format!("transaction {} overspends {}", tx.tx_hash, sender),
                        )
                    })?;
                }
                if !tx.is_token_transfer() {
                    let balance = balances.entry(&tx.recipient).or_insert(Amount::ZERO);
                    *balance = balance.saturating_add(tx.amount);
                }
            }

            let collected = reward.amount.saturating_add(block.total_gas_fees());
            let balance = balances.entry(&reward.recipient).or_insert(Amount::ZERO);
            *balance = balance.saturating_add(collected);
        }

        debug!("Validated chain of {} blocks", self.blocks.len());
        Ok(())
    }
}

fn integrity(index: u64, reason: &str) -> ChainError {
    ChainError::ChainIntegrity {
        index,
        reason: reason.to_string(),
    }
}

fn check_reward(reward: Amount) -> Result<()> {
    if reward == Amount::ZERO {
        return Err(ChainError::Validation(
            "Mining reward must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn check_difficulty(difficulty: u32) -> Result<()> {
    if difficulty > MAX_DIFFICULTY {
        return Err(ChainError::Validation(format!(
            "Difficulty {} exceeds the maximum of {}",
            difficulty, MAX_DIFFICULTY
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn allocation(address: &Address, amount: u64) -> GenesisAllocation {
        GenesisAllocation {
            address: address.clone(),
            amount: Amount::from_num(amount),
        }
    }

    fn signed_transfer(keypair: &KeyPair, to: &Address, amount: u64) -> Transaction {
        let mut tx = Transaction::native(keypair.address(), to.clone(), Amount::from_num(amount), Amount::ZERO);
        tx.sign_with(keypair).unwrap();
        tx
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let a = Address::from_label("a");
        let first = Blockchain::create_genesis(Some(&allocation(&a, 1_000)));
        let second = Blockchain::create_genesis(Some(&allocation(&a, 1_000)));
        assert_eq!(first, second);
        assert_eq!(first.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(first.index, 0);
        assert!(Blockchain::create_genesis(None).transactions.is_empty());
    }

    #[test]
    fn test_genesis_and_reward_scenario() {
        let a = Address::from_label("a");
        let b = Address::from_label("b");
        let mut chain = Blockchain::new(1, Amount::from_num(100), Some(allocation(&a, 1_000_000_000))).unwrap();

        let block = chain.append_block(&b, &CancelToken::new()).unwrap();
        assert!(block.hash.starts_with('0'));
        assert_eq!(chain.balance_of(&a), Amount::from_num(1_000_000_000));
        assert_eq!(chain.balance_of(&b), Amount::from_num(100));
        assert!(chain.is_valid());
    }

    #[test]
    fn test_pending_does_not_affect_replay() {
        let sender = KeyPair::generate();
        let c = Address::from_label("c");
        let miner = Address::from_label("miner");
        let tokens = TokenLedger::new();
        let mut chain = Blockchain::new(0, Amount::from_num(100), Some(allocation(&sender.address(), 100))).unwrap();

        chain.create_transaction(&tokens, signed_transfer(&sender, &c, 50)).unwrap();
        assert_eq!(chain.balance_of(&sender.address()), Amount::from_num(100));
        assert_eq!(chain.mempool.len(), 1);

        chain.append_block(&miner, &CancelToken::new()).unwrap();
        assert_eq!(chain.balance_of(&sender.address()), Amount::from_num(50));
        assert_eq!(chain.balance_of(&c), Amount::from_num(50));
        assert!(chain.mempool.is_empty());
        assert!(chain.is_valid());
    }

    #[test]
    fn test_tampered_amount_invalidates_chain() {
        let sender = KeyPair::generate();
        let c = Address::from_label("c");
        let tokens = TokenLedger::new();
        let mut chain = Blockchain::new(0, Amount::from_num(10), Some(allocation(&sender.address(), 100))).unwrap();
        chain.create_transaction(&tokens, signed_transfer(&sender, &c, 30)).unwrap();
        chain.append_block(&c, &CancelToken::new()).unwrap();
        chain.append_block(&c, &CancelToken::new()).unwrap();
        assert!(chain.is_valid());

        chain.blocks[1].transactions[0].amount = Amount::from_num(31);
        assert!(!chain.is_valid());
        assert!(matches!(
            chain.validate_chain(),
            Err(ChainError::ChainIntegrity { index: 1, .. })
        ));
    }

    #[test]
    fn test_tampered_genesis_invalidates_chain() {
        let a = Address::from_label("a");
        let mut chain = Blockchain::new(0, Amount::from_num(10), Some(allocation(&a, 100))).unwrap();
        chain.blocks[0].transactions[0].amount = Amount::from_num(1_000);
        chain.blocks[0].hash = chain.blocks[0].calculate_hash();
        assert!(!chain.is_valid());
    }

    #[test]
    fn test_broken_link_invalidates_chain() {
        let miner = Address::from_label("miner");
        let mut chain = Blockchain::new(0, Amount::from_num(10), None).unwrap();
        chain.append_block(&miner, &CancelToken::new()).unwrap();
        chain.append_block(&miner, &CancelToken::new()).unwrap();

        chain.blocks[2].previous_hash = "ff".to_string();
        chain.blocks[2].hash = chain.blocks[2].calculate_hash();
        assert!(!chain.is_valid());
    }

    #[test]
    fn test_stale_candidate_rejected() {
        let miner = Address::from_label("miner");
        let mut chain = Blockchain::new(0, Amount::from_num(10), None).unwrap();
        let candidate = chain.candidate_block(&miner).unwrap();
        chain.append_block(&miner, &CancelToken::new()).unwrap();

        let result = chain.commit_block(candidate);
        assert!(matches!(result, Err(ChainError::StaleCandidate(_))));
        assert_eq!(chain.blocks.len(), 2);
    }

    #[test]
    fn test_commit_rejects_unsealed_block() {
        let miner = Address::from_label("miner");
        let mut chain = Blockchain::new(0, Amount::from_num(10), None).unwrap();
        chain.set_difficulty(64).unwrap();
        let candidate = chain.candidate_block(&miner).unwrap();
        assert!(matches!(
            chain.commit_block(candidate),
            Err(ChainError::Validation(_))
        ));
        assert_eq!(chain.blocks.len(), 1);
    }

    #[test]
    fn test_conservation_with_fees() {
        let sender = KeyPair::generate();
        let c = Address::from_label("c");
        let miner = Address::from_label("miner");
        let tokens = TokenLedger::new();
        let mut chain = Blockchain::new(0, Amount::from_num(100), Some(allocation(&sender.address(), 1_000))).unwrap();

        let mut tx = Transaction::native(sender.address(), c.clone(), Amount::from_num(10), Amount::ONE);
        tx.sign_with(&sender).unwrap();
        let fee = tx.gas_fee;
        chain.create_transaction(&tokens, tx).unwrap();
        chain.append_block(&miner, &CancelToken::new()).unwrap();
        chain.append_block(&miner, &CancelToken::new()).unwrap();

        let total: Amount = chain
            .known_addresses()
            .iter()
            .map(|a| chain.balance_of(a))
            .fold(Amount::ZERO, |acc, b| acc + b);
        assert_eq!(total, Amount::from_num(1_000) + Amount::from_num(100) * Amount::from_num(2));
        assert_eq!(chain.balance_of(&miner), Amount::from_num(200) + fee);
    }

    #[test]
    fn test_history_and_lookup() {
        let sender = KeyPair::generate();
        let c = Address::from_label("c");
        let tokens = TokenLedger::new();
        let mut chain = Blockchain::new(0, Amount::from_num(10), Some(allocation(&sender.address(), 100))).unwrap();
        let tx = signed_transfer(&sender, &c, 5);
        let hash = tx.tx_hash.clone();
        chain.create_transaction(&tokens, tx).unwrap();
        let block = chain.append_block(&c, &CancelToken::new()).unwrap();
        chain.append_block(&c, &CancelToken::new()).unwrap();

        let record = chain.transaction_by_hash(&hash).unwrap();
        assert_eq!(record.block_index, 1);
        assert_eq!(record.confirmations, 2);
        assert_eq!(chain.block_by_hash(&block.hash).unwrap().index, 1);

        let history = chain.transactions_for(&sender.address());
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].block_index, 1);
        assert_eq!(history[1].block_index, 0);
    }

    #[test]
    fn test_state_roundtrip() {
        let a = Address::from_label("a");
        let mut chain = Blockchain::new(0, Amount::from_num(7), Some(allocation(&a, 5))).unwrap();
        chain.append_block(&a, &CancelToken::new()).unwrap();

        let json = serde_json::to_string(&chain.to_state()).unwrap();
        let restored = Blockchain::from_state(serde_json::from_str(&json).unwrap());
        assert!(restored.is_valid());
        assert_eq!(restored.balance_of(&a), Amount::from_num(12));
        assert_eq!(restored.mining_reward, Amount::from_num(7));
    }

    #[test]
    fn test_difficulty_bounds() {
        assert!(Blockchain::new(65, Amount::ONE, None).is_err());
        let mut chain = Blockchain::new(0, Amount::ONE, None).unwrap();
        assert!(chain.set_difficulty(64).is_ok());
        assert!(chain.set_difficulty(65).is_err());
        assert!(chain.set_mining_reward(Amount::ZERO).is_err());
    }

    #[test]
    fn test_zero_reward_rejected_at_construction() {
        assert!(matches!(
            Blockchain::new(0, Amount::ZERO, None),
            Err(ChainError::Validation(_))
        ));
    }

    #[test]
    fn test_repeated_transaction_invalidates_chain() {
        let sender = KeyPair::generate();
        let c = Address::from_label("c");
        let miner = Address::from_label("miner");
        let tokens = TokenLedger::new();
        let mut chain = Blockchain::new(0, Amount::from_num(10), Some(allocation(&sender.address(), 100))).unwrap();
        chain.create_transaction(&tokens, signed_transfer(&sender, &c, 5)).unwrap();
        chain.append_block(&miner, &CancelToken::new()).unwrap();
        chain.append_block(&miner, &CancelToken::new()).unwrap();
        assert!(chain.is_valid());

        let mut across = chain.clone();
        let replayed = across.blocks[1].transactions[0].clone();
        across.blocks[2].transactions.insert(0, replayed);
        across.blocks[2].hash = across.blocks[2].calculate_hash();
        assert!(matches!(
            across.validate_chain(),
            Err(ChainError::ChainIntegrity { index: 2, .. })
        ));

        let mut within = chain;
        let repeated = within.blocks[1].transactions[0].clone();
        within.blocks[1].transactions.insert(0, repeated);
        within.blocks[1].hash = within.blocks[1].calculate_hash();
        assert!(matches!(
            within.validate_chain(),
            Err(ChainError::ChainIntegrity { index: 1, .. })
        ));
    }

    #[test]
    fn test_commit_rejects_repeated_transaction_in_block() {
        let sender = KeyPair::generate();
        let miner = Address::from_label("miner");
        let tokens = TokenLedger::new();
        let mut chain = Blockchain::new(0, Amount::from_num(10), Some(allocation(&sender.address(), 100))).unwrap();
        let tx = signed_transfer(&sender, &Address::from_label("c"), 5);
        chain.create_transaction(&tokens, tx.clone()).unwrap();

        let mut candidate = chain.candidate_block(&miner).unwrap();
        candidate.transactions.insert(0, tx);
        candidate.hash = candidate.calculate_hash();
        assert!(matches!(
            chain.commit_block(candidate),
            Err(ChainError::DuplicateResource { .. })
        ));
        assert_eq!(chain.blocks.len(), 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "went negative")]
    fn test_negative_replay_asserts_in_debug() {
        let broke = KeyPair::generate();
        let mut chain = Blockchain::new(0, Amount::from_num(10), None).unwrap();
        let tx = signed_transfer(&broke, &Address::from_label("c"), 5);
        let tip = chain.blocks[0].hash.clone();
        chain.blocks.push(Block::new(1, GENESIS_TIMESTAMP, vec![tx], tip));
        chain.balance_of(&broke.address());
    }
}
