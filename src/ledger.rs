//! The ledger state object: chain, pending pool, token ledger and pools behind one owner.
//!
//! Every mutation runs against a working copy of the state. The copy is saved
//! to the persistence backend and only swapped in once the save succeeds, so a
//! failed operation or a failed save leaves the live state exactly as it was.

use crate::amm::{Amm, LiquidityPool, SwapOutcome};
use crate::blockchain::{Block, Blockchain, TransactionRecord};
use crate::config::ChainConfig;
use crate::crypto::Address;
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::miner::{seal_block, CancelToken};
use crate::persistence::{LedgerSnapshot, Persistence};
use crate::token::{
    ContractAddress, GasSchedule, TokenContract, TokenHolding, TokenLedger, TokenStatistics, TransactionType,
};
use crate::transaction::{now_millis, Transaction};
use crate::Amount;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Native and token balances held by one address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalances {
    pub address: Address,
    pub native: Amount,
    pub tokens: Vec<TokenHolding>,
}

#[derive(Debug, Clone)]
pub struct LedgerState {
    pub chain: Blockchain,
    pub tokens: TokenLedger,
    pub amm: Amm,
}

impl LedgerState {
    pub fn new(chain: Blockchain) -> Self {
        Self {
            chain,
            tokens: TokenLedger::new(),
            amm: Amm::new(),
        }
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            chain: Blockchain::from_state(snapshot.chain),
            tokens: TokenLedger::from_snapshot(snapshot.tokens),
            amm: Amm::from_snapshot(snapshot.amm),
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            chain: self.chain.to_state(),
            tokens: self.tokens.snapshot(),
            amm: self.amm.snapshot(),
        }
    }

    /// Runs every restored pending transaction back through admission against
    /// the restored chain, dropping the ones that no longer pass. Returns how many were dropped.
    fn readmit_pending(&mut self) -> usize {
        let restored = std::mem::replace(&mut self.chain.mempool, Mempool::new()).snapshot();
        let mut dropped = 0;
        for tx in restored {
            let hash = tx.tx_hash.clone();
            if let Err(e) = self.chain.create_transaction(&self.tokens, tx) {
                warn!("Dropping stored pending transaction {}: {}", hash, e);
                dropped += 1;
            }
        }
        dropped
    }

    /// Commits a sealed block and applies the token transfers it carries.
    fn commit_block(&mut self, block: Block) -> Result<()> {
        let token_moves: Vec<(ContractAddress, Address, Address, Amount)> = block
            .transactions
            .iter()
            .filter_map(|tx| match (&tx.token_contract, &tx.sender) {
                (Some(contract), Some(sender)) => {
                    Some((contract.clone(), sender.clone(), tx.recipient.clone(), tx.amount))
                }
                _ => None,
            })
            .collect();

        self.chain.commit_block(block)?;
        for (contract, from, to, amount) in &token_moves {
            self.tokens.transfer(contract, from, to, *amount)?;
        }
        Ok(())
    }
}

pub struct Ledger {
    state: LedgerState,
    persistence: Box<dyn Persistence>,
}

impl Ledger {
    /// Restores the ledger from `persistence`, or bootstraps a fresh chain when the store is empty.
    ///
    /// A restored chain is fully validated first; an integrity failure is reported
    /// and the ledger is not opened. Restored pending transactions are re-admitted,
    /// and any that fail are dropped from the pool.
    pub fn open(config: &ChainConfig, persistence: Box<dyn Persistence>) -> Result<Self> {
        match persistence.load_state()? {
            Some(snapshot) => {
                let mut state = LedgerState::from_snapshot(snapshot);
                if let Err(e) = state.chain.validate_chain() {
                    error!("Stored chain failed validation: {}", e);
                    return Err(e);
                }
                if state.readmit_pending() > 0 {
                    persistence.save_state(&state.snapshot())?;
                }
                info!(
                    "Restored chain at height {} with {} pending transactions",
                    state.chain.height(),
                    state.chain.mempool.len()
                );
                Ok(Self { state, persistence })
            }
            None => {
                let chain = Blockchain::new(config.difficulty, config.mining_reward, config.genesis_allocation())?;
                Self::create(chain, persistence)
            }
        }
    }

    /// Wraps a new chain and writes its initial state.
    pub fn create(chain: Blockchain, persistence: Box<dyn Persistence>) -> Result<Self> {
        let state = LedgerState::new(chain);
        persistence.save_state(&state.snapshot())?;
        Ok(Self { state, persistence })
    }

    fn transact<T>(&mut self, op: impl FnOnce(&mut LedgerState) -> Result<T>) -> Result<T> {
        let mut working = self.state.clone();
        let value = op(&mut working)?;
        self.persistence.save_state(&working.snapshot())?;
        self.state = working;
        Ok(value)
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn chain(&self) -> &Blockchain {
        &self.state.chain
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.state.snapshot()
    }

    // ---- transactions -------------------------------------------------------

    /// Validates and queues a signed transaction. Returns its hash.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<String> {
        self.transact(|state| state.chain.create_transaction(&state.tokens, tx))
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.chain.mempool.snapshot()
    }

    pub fn pending_count(&self) -> usize {
        self.state.chain.mempool.len()
    }

    /// Fee a transaction of this type and size would pay at `gas_price`.
    pub fn gas_fee(&self, tx_type: TransactionType, payload_size: usize, gas_price: Amount) -> Amount {
        GasSchedule::STANDARD.priced_fee(tx_type, payload_size, gas_price)
    }

    // ---- balances -----------------------------------------------------------

    pub fn native_balance(&self, address: &Address) -> Amount {
        self.state.chain.balance_of(address)
    }

    pub fn token_balance(&self, address: &Address, contract: &ContractAddress) -> Amount {
        self.state.tokens.balance_of(address, contract)
    }

    pub fn balances(&self, address: &Address) -> AccountBalances {
        AccountBalances {
            address: address.clone(),
            native: self.native_balance(address),
            tokens: self.state.tokens.balances_of(address),
        }
    }

    // ---- blocks -------------------------------------------------------------

    pub fn height(&self) -> u64 {
        self.state.chain.height()
    }

    pub fn difficulty(&self) -> u32 {
        self.state.chain.difficulty
    }

    pub fn mining_reward(&self) -> Amount {
        self.state.chain.mining_reward
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.state.chain.latest_block()
    }

    pub fn candidate_block(&self, reward_recipient: &Address) -> Result<Block> {
        self.state.chain.candidate_block(reward_recipient)
    }

    /// Links a block sealed elsewhere. The block is durable before this returns.
    pub fn commit_sealed(&mut self, block: Block) -> Result<()> {
        self.transact(|state| state.commit_block(block))
    }

    /// Builds, seals and commits the next block on the calling thread.
    pub fn mine_pending(&mut self, reward_recipient: &Address, cancel: &CancelToken) -> Result<Block> {
        let candidate = self.candidate_block(reward_recipient)?;
        let sealed = seal_block(candidate, self.difficulty(), cancel)?;
        self.commit_sealed(sealed.clone())?;
        Ok(sealed)
    }

    pub fn set_difficulty(&mut self, difficulty: u32) -> Result<()> {
        self.transact(|state| state.chain.set_difficulty(difficulty))?;
        info!("Difficulty set to {}", difficulty);
        Ok(())
    }

    pub fn set_mining_reward(&mut self, reward: Amount) -> Result<()> {
        self.transact(|state| state.chain.set_mining_reward(reward))?;
        info!("Mining reward set to {}", reward);
        Ok(())
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.state.chain.block_by_hash(hash)
    }

    pub fn block_by_index(&self, index: u64) -> Option<&Block> {
        self.state.chain.block_by_index(index)
    }

    pub fn transaction_by_hash(&self, tx_hash: &str) -> Option<TransactionRecord> {
        self.state.chain.transaction_by_hash(tx_hash)
    }

    pub fn transactions_for(&self, address: &Address) -> Vec<TransactionRecord> {
        self.state.chain.transactions_for(address)
    }

    pub fn is_valid(&self) -> bool {
        self.state.chain.is_valid()
    }

    pub fn validate_chain(&self) -> Result<()> {
        self.state.chain.validate_chain()
    }

    // ---- tokens -------------------------------------------------------------

    /// Registers a token and mints its supply to `creator`. Issuance pays no gas.
    pub fn issue_token(
        &mut self,
        name: &str,
        symbol: &str,
        total_supply: Amount,
        decimals: u8,
        creator: &Address,
    ) -> Result<TokenContract> {
        let now = now_millis();
        self.transact(|state| state.tokens.issue(name, symbol, total_supply, decimals, creator, now))
    }

    pub fn token(&self, contract: &ContractAddress) -> Option<&TokenContract> {
        self.state.tokens.contract(contract)
    }

    pub fn token_by_symbol(&self, symbol: &str) -> Option<&TokenContract> {
        self.state.tokens.by_symbol(symbol)
    }

    pub fn tokens(&self) -> Vec<&TokenContract> {
        self.state.tokens.all_contracts()
    }

    pub fn search_tokens(&self, query: &str) -> Vec<&TokenContract> {
        self.state.tokens.search(query)
    }

    pub fn token_statistics(&self) -> TokenStatistics {
        self.state.tokens.statistics()
    }

    // ---- pools --------------------------------------------------------------

    pub fn create_pool(
        &mut self,
        token_a: &str,
        token_b: &str,
        reserve_a: Amount,
        reserve_b: Amount,
        fee_percent: Amount,
    ) -> Result<String> {
        self.transact(|state| state.amm.create_pool(token_a, token_b, reserve_a, reserve_b, fee_percent))
    }

    pub fn quote(&self, pool_id: &str, token_in: &str, amount_in: Amount) -> Result<SwapOutcome> {
        self.state.amm.quote(pool_id, token_in, amount_in)
    }

    pub fn swap(&mut self, pool_id: &str, token_in: &str, amount_in: Amount) -> Result<SwapOutcome> {
        self.transact(|state| state.amm.swap(pool_id, token_in, amount_in))
    }

    pub fn add_liquidity(
        &mut self,
        pool_id: &str,
        token_a: &str,
        amount_a: Amount,
        token_b: &str,
        amount_b: Amount,
    ) -> Result<LiquidityPool> {
        self.transact(|state| state.amm.add_liquidity(pool_id, token_a, amount_a, token_b, amount_b))
    }

    pub fn pool(&self, pool_id: &str) -> Result<&LiquidityPool> {
        self.state.amm.pool(pool_id).ok_or_else(|| ChainError::NotFound {
            kind: "pool",
            id: pool_id.to_string(),
        })
    }

    pub fn pools(&self) -> Vec<&LiquidityPool> {
        self.state.amm.all_pools()
    }
}
