//! Constant-product automated market maker
//!
//! Pools hold two reserves keyed by token symbol. A swap of `amount_in` pays
//! `reserve_out * in_with_fee / (reserve_in + in_with_fee)` where
//! `in_with_fee = amount_in * (100 - fee) / 100`. Fixed-point math rounds every
//! intermediate result down, so the pool never pays out more than the exact
//! formula and `reserve_a * reserve_b` never shrinks across a swap.

use crate::error::{ChainError, Result};
use crate::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub id: String,
    pub token_a: String,
    pub token_b: String,
    pub reserve_a: Amount,
    pub reserve_b: Amount,
    /// Percentage, e.g. 0.3 for 0.3%
    pub fee_percent: Amount,
}

impl LiquidityPool {
    pub fn has_pair(&self, token_x: &str, token_y: &str) -> bool {
        (self.token_a == token_x && self.token_b == token_y)
            || (self.token_a == token_y && self.token_b == token_x)
    }

    /// Reserves ordered as (in, out) for a swap of `token_in`, plus the output token.
    fn orient(&self, token_in: &str) -> Result<(Amount, Amount, &str)> {
        if token_in == self.token_a {
            Ok((self.reserve_a, self.reserve_b, &self.token_b))
        } else if token_in == self.token_b {
            Ok((self.reserve_b, self.reserve_a, &self.token_a))
        } else {
            Err(ChainError::Validation(format!(
                "Token {} is not part of pool {} ({}/{})",
                token_in, self.id, self.token_a, self.token_b
            )))
        }
    }

    /// Price of one `token_a` in `token_b`.
    pub fn spot_price(&self) -> Option<Amount> {
        self.reserve_b.checked_div(self.reserve_a)
    }
}

/// Result of a swap or a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapOutcome {
    pub pool_id: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Amount,
    pub amount_out: Amount,
    pub fee_paid: Amount,
}

/// Serializable form of the AMM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmmSnapshot {
    pub pools: Vec<LiquidityPool>,
    pub next_pool_seq: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Amm {
    pools: BTreeMap<String, LiquidityPool>,
    next_pool_seq: u64,
}

fn hundred() -> Amount {
    Amount::from_num(100)
}

fn overflow(what: &str) -> ChainError {
    ChainError::Validation(format!("Arithmetic overflow computing {}", what))
}

impl Amm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: AmmSnapshot) -> Self {
        Amm {
            pools: snapshot
                .pools
                .into_iter()
                .map(|pool| (pool.id.clone(), pool))
                .collect(),
            next_pool_seq: snapshot.next_pool_seq,
        }
    }

    pub fn snapshot(&self) -> AmmSnapshot {
        AmmSnapshot {
            pools: self.pools.values().cloned().collect(),
            next_pool_seq: self.next_pool_seq,
        }
    }

    /// Registers a pool for a new pair and returns its id.
    pub fn create_pool(
        &mut self,
        token_a: &str,
        token_b: &str,
        reserve_a: Amount,
        reserve_b: Amount,
        fee_percent: Amount,
    ) -> Result<String> {
        if token_a.is_empty() || token_b.is_empty() {
            return Err(ChainError::Validation("Pool tokens must be named".to_string()));
        }
        if token_a == token_b {
            return Err(ChainError::Validation(format!(
                "A pool needs two different tokens, got {} twice",
                token_a
            )));
        }
        if reserve_a == Amount::ZERO || reserve_b == Amount::ZERO {
            return Err(ChainError::Validation(
                "Initial reserves must be greater than zero".to_string(),
            ));
        }
        if fee_percent >= hundred() {
            return Err(ChainError::Validation(format!(
                "Fee must be below 100 percent, got {}",
                fee_percent
            )));
        }
        if let Some(existing) = self.pools.values().find(|p| p.has_pair(token_a, token_b)) {
            return Err(ChainError::DuplicateResource {
                kind: "pool",
                id: existing.id.clone(),
            });
        }

        self.next_pool_seq += 1;
        let id = format!("pool_{}_{}_{}", token_a, token_b, self.next_pool_seq);
        let pool = LiquidityPool {
            id: id.clone(),
            token_a: token_a.to_string(),
            token_b: token_b.to_string(),
            reserve_a,
            reserve_b,
            fee_percent,
        };
        info!(
            "Created pool {} with reserves {} {} / {} {} (fee {}%)",
            id, reserve_a, token_a, reserve_b, token_b, fee_percent
        );
        self.pools.insert(id.clone(), pool);
        Ok(id)
    }

    /// Prices a swap without touching the pool.
    pub fn quote(&self, pool_id: &str, token_in: &str, amount_in: Amount) -> Result<SwapOutcome> {
        let pool = self.require_pool(pool_id)?;
        if amount_in == Amount::ZERO {
            return Err(ChainError::Validation(
                "Swap amount must be greater than zero".to_string(),
            ));
        }
        let (reserve_in, reserve_out, token_out) = pool.orient(token_in)?;

        let fee_factor = (hundred() - pool.fee_percent) / hundred();
        let in_with_fee = amount_in
            .checked_mul(fee_factor)
            .ok_or_else(|| overflow("fee-adjusted input"))?;
        let denominator = reserve_in
            .checked_add(in_with_fee)
            .ok_or_else(|| overflow("swap denominator"))?;
        let share = in_with_fee
            .checked_div(denominator)
            .ok_or_else(|| overflow("swap share"))?;
        let amount_out = reserve_out
            .checked_mul(share)
            .ok_or_else(|| overflow("swap output"))?;

        if amount_out == Amount::ZERO || amount_out >= reserve_out {
            return Err(ChainError::Validation(format!(
                "Swap of {} {} yields no usable output from pool {}",
                amount_in, token_in, pool_id
            )));
        }
        reserve_in
            .checked_add(amount_in)
            .ok_or_else(|| overflow("input reserve"))?;

        Ok(SwapOutcome {
            pool_id: pool.id.clone(),
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            amount_out,
            fee_paid: amount_in - in_with_fee,
        })
    }

    /// Executes a swap: `reserve_in += amount_in`, `reserve_out -= amount_out`.
    pub fn swap(&mut self, pool_id: &str, token_in: &str, amount_in: Amount) -> Result<SwapOutcome> {
        let outcome = self.quote(pool_id, token_in, amount_in)?;
        let pool = self.require_pool_mut(pool_id)?;

        if token_in == pool.token_a {
            pool.reserve_a += outcome.amount_in;
            pool.reserve_b -= outcome.amount_out;
        } else {
            pool.reserve_b += outcome.amount_in;
            pool.reserve_a -= outcome.amount_out;
        }

        debug!(
            "Swapped {} {} for {} {} in {}",
            outcome.amount_in, outcome.token_in, outcome.amount_out, outcome.token_out, pool_id
        );
        Ok(outcome)
    }

    /// Adds to both reserves. The tokens may be given in either order.
    pub fn add_liquidity(
        &mut self,
        pool_id: &str,
        token_a: &str,
        amount_a: Amount,
        token_b: &str,
        amount_b: Amount,
    ) -> Result<LiquidityPool> {
        if amount_a == Amount::ZERO || amount_b == Amount::ZERO {
            return Err(ChainError::Validation(
                "Liquidity amounts must be greater than zero".to_string(),
            ));
        }
        let pool = self.require_pool_mut(pool_id)?;
        if !pool.has_pair(token_a, token_b) {
            return Err(ChainError::Validation(format!(
                "Tokens {}/{} do not match pool {} ({}/{})",
                token_a, token_b, pool_id, pool.token_a, pool.token_b
            )));
        }

        let (add_a, add_b) = if token_a == pool.token_a {
            (amount_a, amount_b)
        } else {
            (amount_b, amount_a)
        };
        let reserve_a = pool
            .reserve_a
            .checked_add(add_a)
            .ok_or_else(|| overflow("reserve"))?;
        let reserve_b = pool
            .reserve_b
            .checked_add(add_b)
            .ok_or_else(|| overflow("reserve"))?;
        pool.reserve_a = reserve_a;
        pool.reserve_b = reserve_b;

        debug!("Added liquidity to {}: {} / {}", pool_id, add_a, add_b);
        Ok(pool.clone())
    }

    pub fn pool(&self, pool_id: &str) -> Option<&LiquidityPool> {
        self.pools.get(pool_id)
    }

    pub fn all_pools(&self) -> Vec<&LiquidityPool> {
        self.pools.values().collect()
    }

    pub fn find_pool(&self, token_x: &str, token_y: &str) -> Option<&LiquidityPool> {
        self.pools.values().find(|p| p.has_pair(token_x, token_y))
    }

    fn require_pool(&self, pool_id: &str) -> Result<&LiquidityPool> {
        self.pools.get(pool_id).ok_or_else(|| ChainError::NotFound {
            kind: "pool",
            id: pool_id.to_string(),
        })
    }

    fn require_pool_mut(&mut self, pool_id: &str) -> Result<&mut LiquidityPool> {
        self.pools.get_mut(pool_id).ok_or_else(|| ChainError::NotFound {
            kind: "pool",
            id: pool_id.to_string(),
        })
    }
}
