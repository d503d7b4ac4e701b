use crate::error::{ChainError, Result, TokenError, TokenErrorCode};
use crate::token::ledger::insufficient_token_balance;
use crate::token::TokenLedger;
use crate::transaction::Transaction;
use serde_json::json;
use tracing::debug;

use super::chain::Blockchain;

/// Validates `tx` and appends it to the pending pool. Returns its hash.
///
/// Checks run in a fixed order and the first failure rejects the transaction
/// without touching the pool. Balances are checked net of what the sender has
/// already committed to in pending transactions.
pub fn admit_transaction(chain: &mut Blockchain, tokens: &TokenLedger, tx: Transaction) -> Result<String> {
    tx.validate_fields()?;

    if let Some(contract) = &tx.token_contract {
        tokens.require_contract(contract)?;
    }

    tx.validate_gas()?;
    tx.validate_size()?;
    tx.validate_hash()?;
    tx.validate_signature()?;

    if chain.mempool.contains(&tx.tx_hash) || chain.contains_transaction(&tx.tx_hash) {
        return Err(ChainError::DuplicateResource {
            kind: "transaction",
            id: tx.tx_hash.clone(),
        });
    }

    check_funds(chain, tokens, &tx)?;

    let hash = tx.tx_hash.clone();
    debug!(
        "Admitted transaction {} ({:?}, amount {}, gas {})",
        hash,
        tx.transaction_type(),
        tx.amount,
        tx.gas_fee
    );
    chain.mempool.add_transaction(tx)?;
    Ok(hash)
}

fn check_funds(chain: &Blockchain, tokens: &TokenLedger, tx: &Transaction) -> Result<()> {
    let sender = match &tx.sender {
        Some(sender) => sender,
        None => return Ok(()),
    };

    let native_available = chain
        .balance_of(sender)
        .saturating_sub(chain.mempool.pending_native_outgoing(sender));

    match &tx.token_contract {
        None => {
            let required = tx.native_cost().ok_or_else(|| {
                ChainError::Validation("Transaction amount plus gas overflows".to_string())
            })?;
            if native_available < required {
                return Err(ChainError::InsufficientBalance {
                    available: native_available,
                    required,
                });
            }
        }
        Some(contract) => {
            let token_available = tokens
                .balance_of(sender, contract)
                .saturating_sub(chain.mempool.pending_token_outgoing(sender, contract));
            if token_available < tx.amount {
                return Err(insufficient_token_balance(contract, sender, token_available, tx.amount).into());
            }
            if native_available < tx.gas_fee {
                return Err(TokenError::new(
                    TokenErrorCode::InsufficientGasBalance,
                    format!(
                        "Insufficient native balance for gas: available {}, required {}",
                        native_available, tx.gas_fee
                    ),
                    json!({
                        "address": sender.as_str(),
                        "available": native_available.to_string(),
                        "required": tx.gas_fee.to_string(),
                    }),
                )
                .into());
            }
        }
    }

    Ok(())
}
