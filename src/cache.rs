//! Caching layer for frequently read ledger data
//!
//! Provides LRU caching for:
//! - Recently committed blocks, keyed by hash
//! - Replayed native balances, keyed by address
//!
//! Balances are only ever derived from sealed blocks, so the balance cache is
//! dropped whenever a block is committed and never touched by pending transactions.
use crate::blockchain::Block;
use crate::crypto::Address;
use crate::Amount;
use lru::LruCache;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cheaply cloneable LRU handle; clones share one `LruCache` behind an async RwLock.
pub struct ThreadSafeCache<K, V> {
    cache: Arc<RwLock<LruCache<K, V>>>,
}

impl<K, V> ThreadSafeCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Holds at most `capacity` entries. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
        }
    }

    pub async fn capacity(&self) -> usize {
        self.cache.read().await.cap().get()
    }

    /// (entries, capacity)
    pub async fn stats(&self) -> (usize, usize) {
        let cache = self.cache.read().await;
        (cache.len(), cache.cap().get())
    }

    /// Looks up a value without promoting it.
    pub async fn get<Q: ?Sized>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.cache.read().await.peek(key).cloned()
    }

    pub async fn put(&self, key: K, value: V) {
        self.cache.write().await.put(key, value);
    }

    pub async fn remove<Q: ?Sized>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.cache.write().await.pop(key)
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

impl<K, V> Clone for ThreadSafeCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

/// Recently committed blocks by hash.
pub type BlockCache = ThreadSafeCache<String, Block>;

impl BlockCache {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub async fn insert_block(&self, block: &Block) {
        self.put(block.hash.clone(), block.clone()).await;
    }
}

/// Replayed native balances by address.
pub type BalanceCache = ThreadSafeCache<Address, Amount>;

impl BalanceCache {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub async fn get_balance(&self, address: &Address) -> Option<Amount> {
        self.get(address).await
    }

    pub async fn set(&self, address: Address, balance: Amount) {
        self.put(address, balance).await;
    }

    pub async fn invalidate_all(&self) {
        self.clear().await;
    }
}

/// Combined cache for ledger reads.
#[derive(Clone)]
pub struct LedgerCache {
    pub blocks: BlockCache,
    pub balances: BalanceCache,
}

impl LedgerCache {
    pub fn new(block_capacity: usize, balance_capacity: usize) -> Self {
        Self {
            blocks: BlockCache::new(block_capacity),
            balances: BalanceCache::new(balance_capacity),
        }
    }

    /// Records a newly committed block and drops every cached balance.
    pub async fn on_block_committed(&self, block: &Block) {
        self.balances.invalidate_all().await;
        self.blocks.insert_block(block).await;
    }

    pub async fn clear_all(&self) {
        self.blocks.clear().await;
        self.balances.invalidate_all().await;
    }
}

impl Default for LedgerCache {
    fn default() -> Self {
        Self::new(BlockCache::DEFAULT_CAPACITY, BalanceCache::DEFAULT_CAPACITY)
    }
}
