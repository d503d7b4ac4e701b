//! Database persistence layer for PSNChain

use crate::amm::{AmmSnapshot, LiquidityPool};
use crate::blockchain::{Block, ChainState, GenesisAllocation};
use crate::error::ChainError;
use crate::token::{TokenBalance, TokenContract, TokenLedgerSnapshot};
use crate::transaction::Transaction;
use crate::Amount;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Complete ledger state as written to and read from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub chain: ChainState,
    pub tokens: TokenLedgerSnapshot,
    pub amm: AmmSnapshot,
}

/// Abstraction for persistence backends. `save_state` must be atomic: after an
/// error the previously saved state is still the one `load_state` returns.
pub trait Persistence: Send + Sync {
    fn save_state(&self, snapshot: &LedgerSnapshot) -> Result<(), ChainError>;
    fn load_state(&self) -> Result<Option<LedgerSnapshot>, ChainError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blocks (
                height INTEGER PRIMARY KEY,
                hash TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                nonce INTEGER NOT NULL,
                transactions TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pending_transactions (
                position INTEGER PRIMARY KEY,
                tx_hash TEXT NOT NULL,
                tx_data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS contracts (
                contract_address TEXT PRIMARY KEY,
                symbol TEXT NOT NULL UNIQUE,
                contract_data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS token_balances (
                address TEXT NOT NULL,
                contract_address TEXT NOT NULL,
                balance TEXT NOT NULL,
                PRIMARY KEY (address, contract_address)
            );
            CREATE TABLE IF NOT EXISTS pools (
                id TEXT PRIMARY KEY,
                pool_data TEXT NOT NULL
            );",
        )
        .map_err(|e| ChainError::Database(format!("Failed to create tables: {}", e)))?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ChainError> {
        self.conn
            .lock()
            .map_err(|_| ChainError::Database("Mutex poisoned".to_string()))
    }

    /// Writes the whole snapshot in one SQLite transaction.
    pub fn save_state(&self, snapshot: &LedgerSnapshot) -> Result<(), ChainError> {
        let conn_guard = self.lock()?;
        let tx = conn_guard.unchecked_transaction().map_err(|e| {
            ChainError::Database(format!("Failed to start transaction: {}", e))
        })?;

        // Blocks are append-only; only heights above the stored tip are written.
        let stored_height: Option<i64> = tx
            .query_row("SELECT MAX(height) FROM blocks", [], |row| row.get(0))
            .map_err(|e| ChainError::Database(format!("Failed to read chain height: {}", e)))?;
        let first_new = stored_height.map_or(0, |h| (h + 1).max(0) as usize);
        if snapshot.chain.blocks.len() < first_new {
            tx.execute(
                "DELETE FROM blocks WHERE height >= ?1",
                params![snapshot.chain.blocks.len() as i64],
            )
            .map_err(|e| ChainError::Database(format!("Failed to truncate blocks: {}", e)))?;
        }
        for block in snapshot.chain.blocks.iter().skip(first_new.min(snapshot.chain.blocks.len())) {
            let transactions_json = serde_json::to_string(&block.transactions)?;
            tx.execute(
                "INSERT OR REPLACE INTO blocks (height, hash, previous_hash, timestamp, nonce, transactions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    block.index as i64,
                    block.hash,
                    block.previous_hash,
                    block.timestamp as i64,
                    block.nonce as i64,
                    transactions_json,
                ],
            )
            .map_err(|e| ChainError::Database(format!("Failed to save block: {}", e)))?;
        }

        tx.execute("DELETE FROM pending_transactions", [])
            .map_err(|e| ChainError::Database(format!("Failed to clear pending pool: {}", e)))?;
        for (position, pending) in snapshot.chain.pending.iter().enumerate() {
            tx.execute(
                "INSERT INTO pending_transactions (position, tx_hash, tx_data) VALUES (?1, ?2, ?3)",
                params![position as i64, pending.tx_hash, serde_json::to_string(pending)?],
            )
            .map_err(|e| ChainError::Database(format!("Failed to save pending transaction: {}", e)))?;
        }

        let metadata = [
            ("difficulty", snapshot.chain.difficulty.to_string()),
            ("mining_reward", snapshot.chain.mining_reward.to_string()),
            ("genesis", serde_json::to_string(&snapshot.chain.genesis)?),
            ("next_pool_seq", snapshot.amm.next_pool_seq.to_string()),
        ];
        for (key, value) in metadata {
            tx.execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| ChainError::Database(format!("Failed to save {}: {}", key, e)))?;
        }

        tx.execute("DELETE FROM contracts", [])
            .map_err(|e| ChainError::Database(format!("Failed to clear contracts: {}", e)))?;
        for contract in &snapshot.tokens.contracts {
            tx.execute(
                "INSERT INTO contracts (contract_address, symbol, contract_data) VALUES (?1, ?2, ?3)",
                params![
                    contract.contract_address.as_str(),
                    contract.symbol,
                    serde_json::to_string(contract)?
                ],
            )
            .map_err(|e| ChainError::Database(format!("Failed to save contract: {}", e)))?;
        }

        tx.execute("DELETE FROM token_balances", [])
            .map_err(|e| ChainError::Database(format!("Failed to clear token balances: {}", e)))?;
        for row in &snapshot.tokens.balances {
            tx.execute(
                "INSERT INTO token_balances (address, contract_address, balance) VALUES (?1, ?2, ?3)",
                params![
                    row.address.as_str(),
                    row.contract_address.as_str(),
                    row.balance.to_string()
                ],
            )
            .map_err(|e| ChainError::Database(format!("Failed to save token balance: {}", e)))?;
        }

        tx.execute("DELETE FROM pools", [])
            .map_err(|e| ChainError::Database(format!("Failed to clear pools: {}", e)))?;
        for pool in &snapshot.amm.pools {
            tx.execute(
                "INSERT INTO pools (id, pool_data) VALUES (?1, ?2)",
                params![pool.id, serde_json::to_string(pool)?],
            )
            .map_err(|e| ChainError::Database(format!("Failed to save pool: {}", e)))?;
        }

        // Commit all changes atomically
        tx.commit()
            .map_err(|e| ChainError::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(())
    }

    pub fn load_state(&self) -> Result<Option<LedgerSnapshot>, ChainError> {
        let conn_guard = self.lock()?;

        let blocks = {
            let mut stmt = conn_guard
                .prepare(
                    "SELECT height, hash, previous_hash, timestamp, nonce, transactions
                     FROM blocks ORDER BY height ASC",
                )
                .map_err(|e| ChainError::Database(format!("Failed to prepare query: {}", e)))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })
                .map_err(|e| ChainError::Database(format!("Failed to query blocks: {}", e)))?;

            let mut blocks = Vec::new();
            for row in rows {
                let (height, hash, previous_hash, timestamp, nonce, transactions_json) =
                    row.map_err(|e| ChainError::Database(format!("Failed to load block: {}", e)))?;
                let transactions: Vec<Transaction> = serde_json::from_str(&transactions_json)?;
                blocks.push(Block {
                    index: height as u64,
                    timestamp: timestamp as u64,
                    transactions,
                    previous_hash,
                    nonce: nonce as u64,
                    hash,
                });
            }
            blocks
        };

        if blocks.is_empty() {
            return Ok(None);
        }

        let pending: Vec<Transaction> =
            load_json_column(&conn_guard, "SELECT tx_data FROM pending_transactions ORDER BY position ASC")?;
        let contracts: Vec<TokenContract> =
            load_json_column(&conn_guard, "SELECT contract_data FROM contracts ORDER BY contract_address ASC")?;
        let pools: Vec<LiquidityPool> =
            load_json_column(&conn_guard, "SELECT pool_data FROM pools ORDER BY id ASC")?;

        let balances = {
            let mut stmt = conn_guard
                .prepare("SELECT address, contract_address, balance FROM token_balances ORDER BY contract_address ASC, address ASC")
                .map_err(|e| ChainError::Database(format!("Failed to prepare query: {}", e)))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(|e| ChainError::Database(format!("Failed to query token balances: {}", e)))?;

            let mut balances = Vec::new();
            for row in rows {
                let (address, contract_address, balance) =
                    row.map_err(|e| ChainError::Database(format!("Failed to read row: {}", e)))?;
                balances.push(TokenBalance {
                    address: address.parse()?,
                    contract_address: contract_address.parse()?,
                    balance: parse_amount(&balance)?,
                });
            }
            balances
        };

        let difficulty = read_metadata(&conn_guard, "difficulty")?
            .map(|v| {
                v.parse::<u32>()
                    .map_err(|e| ChainError::Database(format!("Invalid stored difficulty: {}", e)))
            })
            .transpose()?
            .unwrap_or(0);
        let mining_reward = read_metadata(&conn_guard, "mining_reward")?
            .map(|v| parse_amount(&v))
            .transpose()?
            .unwrap_or(Amount::ZERO);
        let genesis: Option<GenesisAllocation> = match read_metadata(&conn_guard, "genesis")? {
            Some(v) => serde_json::from_str(&v)?,
            None => None,
        };
        let next_pool_seq = read_metadata(&conn_guard, "next_pool_seq")?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(pools.len() as u64);

        Ok(Some(LedgerSnapshot {
            chain: ChainState {
                blocks,
                pending,
                difficulty,
                mining_reward,
                genesis,
            },
            tokens: TokenLedgerSnapshot { contracts, balances },
            amm: AmmSnapshot {
                pools,
                next_pool_seq,
            },
        }))
    }
}

fn load_json_column<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    sql: &str,
) -> Result<Vec<T>, ChainError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| ChainError::Database(format!("Failed to prepare query: {}", e)))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| ChainError::Database(format!("Failed to query rows: {}", e)))?;

    let mut items = Vec::new();
    for row in rows {
        let json = row.map_err(|e| ChainError::Database(format!("Failed to read row: {}", e)))?;
        items.push(serde_json::from_str(&json)?);
    }
    Ok(items)
}

fn read_metadata(conn: &Connection, key: &str) -> Result<Option<String>, ChainError> {
    conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| ChainError::Database(format!("Failed to read {}: {}", key, e)))
}

fn parse_amount(value: &str) -> Result<Amount, ChainError> {
    value
        .parse::<Amount>()
        .map_err(|e| ChainError::Database(format!("Invalid stored amount '{}': {}", value, e)))
}

// Implement the Persistence trait for the rusqlite-backed Database
impl Persistence for Database {
    fn save_state(&self, snapshot: &LedgerSnapshot) -> Result<(), ChainError> {
        Database::save_state(self, snapshot)
    }

    fn load_state(&self) -> Result<Option<LedgerSnapshot>, ChainError> {
        Database::load_state(self)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
/// Clones share the same underlying state.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    state: std::sync::Arc<parking_lot::RwLock<Option<LedgerSnapshot>>>,
    saves: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Persistence for InMemoryPersistence {
    fn save_state(&self, snapshot: &LedgerSnapshot) -> Result<(), ChainError> {
        *self.state.write() = Some(snapshot.clone());
        self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn load_state(&self) -> Result<Option<LedgerSnapshot>, ChainError> {
        Ok(self.state.read().clone())
    }
}
