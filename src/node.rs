//! Async owner of the ledger.
//!
//! All access goes through one `tokio::sync::RwLock<Ledger>`. Sealing runs on a
//! blocking worker without holding the lock, so admission keeps going while a
//! block is being sealed; the sealed block is then committed under the write
//! lock and rejected as stale if the tip moved in the meantime.

use crate::blockchain::Block;
use crate::cache::LedgerCache;
use crate::config::Config;
use crate::crypto::Address;
use crate::error::{ChainError, Result};
use crate::ledger::{AccountBalances, Ledger};
use crate::miner::{seal_block, CancelToken};
use crate::persistence::{Database, InMemoryPersistence, Persistence};
use crate::transaction::Transaction;
use crate::Amount;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How often an idle miner loop re-checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Ready,
    /// Running on in-memory persistence after the configured store failed to open.
    Degraded,
    Stopped,
}

pub struct Node {
    ledger: Arc<RwLock<Ledger>>,
    cache: LedgerCache,
    sealing: parking_lot::Mutex<Option<CancelToken>>,
    shutdown: CancelToken,
    state: parking_lot::RwLock<NodeState>,
}

impl Node {
    pub fn new(ledger: Ledger) -> Self {
        Self::with_state(ledger, NodeState::Ready)
    }

    fn with_state(ledger: Ledger, state: NodeState) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
            cache: LedgerCache::default(),
            sealing: parking_lot::Mutex::new(None),
            shutdown: CancelToken::new(),
            state: parking_lot::RwLock::new(state),
        }
    }

    /// Opens the configured store and restores or bootstraps the ledger.
    ///
    /// A store that cannot be opened is replaced by in-memory persistence and the
    /// node reports [`NodeState::Degraded`].
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.database.path;
        let (persistence, state) = match open_database(path) {
            Ok(db) => (Box::new(db) as Box<dyn Persistence>, NodeState::Ready),
            Err(e) => {
                warn!(
                    "Failed to open DB at {}: {}. Falling back to in-memory persistence.",
                    path, e
                );
                (Box::new(InMemoryPersistence::new()) as Box<dyn Persistence>, NodeState::Degraded)
            }
        };

        let ledger = Ledger::open(&config.chain, persistence)?;
        info!(
            "Node ready at height {} (difficulty {}, reward {})",
            ledger.height(),
            ledger.difficulty(),
            ledger.mining_reward()
        );
        Ok(Self::with_state(ledger, state))
    }

    /// Shared handle to the ledger for read-mostly callers.
    pub fn ledger(&self) -> Arc<RwLock<Ledger>> {
        Arc::clone(&self.ledger)
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub fn is_sealing(&self) -> bool {
        self.sealing.lock().is_some()
    }

    pub async fn submit_transaction(&self, tx: Transaction) -> Result<String> {
        self.ledger.write().await.submit_transaction(tx)
    }

    /// Native balance, served from the cache when possible.
    pub async fn balance(&self, address: &Address) -> Amount {
        if let Some(balance) = self.cache.balances.get_balance(address).await {
            return balance;
        }
        // Holding the read lock keeps a commit (and its cache flush) from interleaving.
        let ledger = self.ledger.read().await;
        self.native_balance_under(&ledger, address).await
    }

    /// Native and token balances read under a single guard, so both reflect the same tip.
    pub async fn balances(&self, address: &Address) -> AccountBalances {
        let ledger = self.ledger.read().await;
        AccountBalances {
            address: address.clone(),
            native: self.native_balance_under(&ledger, address).await,
            tokens: ledger.state().tokens.balances_of(address),
        }
    }

    async fn native_balance_under(&self, ledger: &Ledger, address: &Address) -> Amount {
        if let Some(balance) = self.cache.balances.get_balance(address).await {
            return balance;
        }
        let balance = ledger.native_balance(address);
        self.cache.balances.set(address.clone(), balance).await;
        balance
    }

    pub async fn block_by_hash(&self, hash: &str) -> Option<Block> {
        if let Some(block) = self.cache.blocks.get(hash).await {
            return Some(block);
        }
        let block = self.ledger.read().await.block_by_hash(hash).cloned()?;
        self.cache.blocks.insert_block(&block).await;
        Some(block)
    }

    /// Seals the pending pool into a new block rewarding `recipient`.
    ///
    /// Starting a seal cancels any seal already in flight.
    pub async fn mine_block(&self, recipient: &Address) -> Result<Block> {
        let cancel = CancelToken::new();
        if let Some(previous) = self.sealing.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        let (candidate, difficulty) = {
            let ledger = self.ledger.read().await;
            (ledger.candidate_block(recipient)?, ledger.difficulty())
        };
        debug!(
            "Sealing block {} with {} transactions at difficulty {}",
            candidate.index,
            candidate.transactions.len(),
            difficulty
        );

        let worker_cancel = cancel.clone();
        let sealed = tokio::task::spawn_blocking(move || seal_block(candidate, difficulty, &worker_cancel))
            .await
            .map_err(|e| ChainError::Worker(format!("sealing task failed: {}", e)));
        self.release_seal(&cancel);
        let sealed = sealed??;
        if cancel.is_cancelled() {
            return Err(ChainError::SealingCancelled);
        }

        let mut ledger = self.ledger.write().await;
        ledger.commit_sealed(sealed.clone())?;
        self.cache.on_block_committed(&sealed).await;
        drop(ledger);

        info!("Mined block {} ({})", sealed.index, sealed.hash);
        Ok(sealed)
    }

    fn release_seal(&self, token: &CancelToken) {
        let mut slot = self.sealing.lock();
        if slot.as_ref().is_some_and(|current| current.same_as(token)) {
            *slot = None;
        }
    }

    /// Cancels the in-flight seal, if any. Returns whether one was running.
    pub fn cancel_sealing(&self) -> bool {
        match self.sealing.lock().take() {
            Some(token) => {
                token.cancel();
                info!("Cancelled in-flight sealing");
                true
            }
            None => false,
        }
    }

    /// Changes difficulty. A seal in flight was started for the old value and is cancelled.
    pub async fn set_difficulty(&self, difficulty: u32) -> Result<()> {
        let mut ledger = self.ledger.write().await;
        ledger.set_difficulty(difficulty)?;
        self.cancel_sealing();
        Ok(())
    }

    pub async fn set_mining_reward(&self, reward: Amount) -> Result<()> {
        self.ledger.write().await.set_mining_reward(reward)
    }

    /// Stops the miner loop and any in-flight seal.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.cancel_sealing();
        *self.state.write() = NodeState::Stopped;
    }

    /// Mines every `interval` while transactions are pending, until [`Node::shutdown`].
    pub async fn run_miner(&self, beneficiary: Address, interval: Duration) {
        info!("Miner loop started, rewarding {}", beneficiary);
        while !self.shutdown.is_cancelled() {
            if self.ledger.read().await.pending_count() > 0 {
                match self.mine_block(&beneficiary).await {
                    Ok(_) => {}
                    Err(ChainError::SealingCancelled) | Err(ChainError::StaleCandidate(_)) => {
                        debug!("Discarded sealed candidate, retrying next round");
                    }
                    Err(e) => warn!("Mining failed: {}", e),
                }
            }
            self.wait(interval).await;
        }
        info!("Miner loop stopped");
    }

    async fn wait(&self, interval: Duration) {
        let mut remaining = interval;
        while !remaining.is_zero() && !self.shutdown.is_cancelled() {
            let step = remaining.min(SHUTDOWN_POLL);
            tokio::time::sleep(step).await;
            remaining -= step;
        }
    }
}

fn open_database(path: &str) -> Result<Database> {
    if path != ":memory:" {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
    }
    Database::open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenesisConfig;
    use crate::crypto::KeyPair;
    use crate::miner::MAX_DIFFICULTY;

    fn memory_config(genesis: &Address, amount: u64, difficulty: u32) -> Config {
        let mut config = Config::default();
        config.database.path = ":memory:".to_string();
        config.chain.difficulty = difficulty;
        config.chain.genesis = Some(GenesisConfig {
            address: genesis.clone(),
            amount: Amount::from_num(amount),
        });
        config
    }

    fn signed_transfer(keypair: &KeyPair, to: &Address, amount: u64) -> Transaction {
        let mut tx = Transaction::native(keypair.address(), to.clone(), Amount::from_num(amount), Amount::ZERO);
        tx.sign_with(keypair).unwrap();
        tx
    }

    #[tokio::test]
    async fn test_mine_block_commits_and_refreshes_cache() {
        tokio::time::timeout(Duration::from_secs(30), async {
            let keypair = KeyPair::generate();
            let recipient = Address::from_label("recipient");
            let miner = Address::from_label("miner");
            let node = Node::open(&memory_config(&keypair.address(), 100, 1)).unwrap();
            assert_eq!(node.state(), NodeState::Ready);

            node.submit_transaction(signed_transfer(&keypair, &recipient, 50))
                .await
                .unwrap();
            // Cached before the block exists.
            assert_eq!(node.balance(&keypair.address()).await, Amount::from_num(100));

            let block = node.mine_block(&miner).await.unwrap();
            assert!(block.hash.starts_with('0'));
            assert!(!node.is_sealing());

            assert_eq!(node.balance(&keypair.address()).await, Amount::from_num(50));
            assert_eq!(node.balance(&recipient).await, Amount::from_num(50));
            assert_eq!(node.balance(&miner).await, Amount::from_num(100));
            assert_eq!(node.block_by_hash(&block.hash).await, Some(block));
        })
        .await
        .expect("test_mine_block_commits_and_refreshes_cache timed out");
    }

    #[tokio::test]
    async fn test_balances_track_one_tip() {
        tokio::time::timeout(Duration::from_secs(30), async {
            let keypair = KeyPair::generate();
            let recipient = Address::from_label("recipient");
            let node = Node::open(&memory_config(&keypair.address(), 1_000, 0)).unwrap();

            let gold = node
                .ledger()
                .write()
                .await
                .issue_token("Gold Coin", "GLD", Amount::from_num(1_000), 2, &keypair.address())
                .unwrap();
            let mut tx = Transaction::token(
                keypair.address(),
                recipient.clone(),
                gold.contract_address.clone(),
                Amount::from_num(250),
                Amount::ONE,
            );
            tx.sign_with(&keypair).unwrap();
            let gas = tx.gas_fee;
            node.submit_transaction(tx).await.unwrap();

            let before = node.balances(&keypair.address()).await;
            assert_eq!(before.native, Amount::from_num(1_000));
            assert_eq!(before.tokens[0].balance, Amount::from_num(1_000));

            node.mine_block(&Address::from_label("miner")).await.unwrap();

            let after = node.balances(&keypair.address()).await;
            assert_eq!(after.native, Amount::from_num(1_000) - gas);
            assert_eq!(after.tokens[0].balance, Amount::from_num(750));
            assert_eq!(node.balances(&recipient).await.tokens[0].balance, Amount::from_num(250));
        })
        .await
        .expect("test_balances_track_one_tip timed out");
    }

    #[tokio::test]
    async fn test_cancel_discards_block() {
        tokio::time::timeout(Duration::from_secs(30), async {
            let node = Arc::new(Node::open(&memory_config(&Address::from_label("g"), 1, 0)).unwrap());
            // Unreachable difficulty: only cancellation ends the seal.
            node.ledger().write().await.set_difficulty(MAX_DIFFICULTY).unwrap();

            let worker = Arc::clone(&node);
            let handle = tokio::spawn(async move { worker.mine_block(&Address::from_label("m")).await });

            while !node.is_sealing() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert!(node.cancel_sealing());

            let result = handle.await.unwrap();
            assert!(matches!(result, Err(ChainError::SealingCancelled)));
            assert_eq!(node.ledger().read().await.height(), 0);
        })
        .await
        .expect("test_cancel_discards_block timed out");
    }

    #[tokio::test]
    async fn test_set_difficulty_cancels_seal() {
        tokio::time::timeout(Duration::from_secs(30), async {
            let node = Arc::new(Node::open(&memory_config(&Address::from_label("g"), 1, 0)).unwrap());
            node.set_difficulty(MAX_DIFFICULTY).await.unwrap();

            let worker = Arc::clone(&node);
            let handle = tokio::spawn(async move { worker.mine_block(&Address::from_label("m")).await });
            while !node.is_sealing() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }

            node.set_difficulty(0).await.unwrap();
            assert!(matches!(handle.await.unwrap(), Err(ChainError::SealingCancelled)));

            let block = node.mine_block(&Address::from_label("m")).await.unwrap();
            assert_eq!(block.index, 1);
        })
        .await
        .expect("test_set_difficulty_cancels_seal timed out");
    }

    #[tokio::test]
    async fn test_admission_continues_while_sealing() {
        tokio::time::timeout(Duration::from_secs(30), async {
            let keypair = KeyPair::generate();
            let node = Arc::new(Node::open(&memory_config(&keypair.address(), 100, 0)).unwrap());
            node.set_difficulty(MAX_DIFFICULTY).await.unwrap();

            let worker = Arc::clone(&node);
            let handle = tokio::spawn(async move { worker.mine_block(&Address::from_label("m")).await });
            while !node.is_sealing() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }

            node.submit_transaction(signed_transfer(&keypair, &Address::from_label("c"), 10))
                .await
                .unwrap();
            assert_eq!(node.ledger().read().await.pending_count(), 1);

            node.shutdown();
            assert!(handle.await.unwrap().is_err());
            assert_eq!(node.state(), NodeState::Stopped);
        })
        .await
        .expect("test_admission_continues_while_sealing timed out");
    }

    #[tokio::test]
    async fn test_miner_loop_mines_pending_until_shutdown() {
        tokio::time::timeout(Duration::from_secs(30), async {
            let keypair = KeyPair::generate();
            let node = Arc::new(Node::open(&memory_config(&keypair.address(), 100, 0)).unwrap());
            node.submit_transaction(signed_transfer(&keypair, &Address::from_label("c"), 10))
                .await
                .unwrap();

            let worker = Arc::clone(&node);
            let miner = Address::from_label("m");
            let handle = tokio::spawn(async move {
                worker.run_miner(miner, Duration::from_millis(10)).await;
            });

            while node.ledger().read().await.height() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            node.shutdown();
            handle.await.unwrap();

            let ledger = node.ledger();
            let ledger = ledger.read().await;
            assert_eq!(ledger.height(), 1);
            assert_eq!(ledger.pending_count(), 0);
        })
        .await
        .expect("test_miner_loop_mines_pending_until_shutdown timed out");
    }

    #[tokio::test]
    async fn test_unopenable_store_degrades_to_memory() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let dir = tempfile::TempDir::new().unwrap();
            let mut config = Config::default();
            // A directory is not a database file.
            config.database.path = dir.path().to_string_lossy().into_owned();
            let node = Node::open(&config).unwrap();
            assert_eq!(node.state(), NodeState::Degraded);
            assert_eq!(node.ledger().read().await.height(), 0);
        })
        .await
        .expect("test_unopenable_store_degrades_to_memory timed out");
    }
}
