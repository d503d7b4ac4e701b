/// Per-contract balance table and token registry
use super::contract::{ContractAddress, ContractAddressGenerator, TokenContract};
use crate::crypto::Address;
use crate::error::{ChainError, Result, TokenError, TokenErrorCode};
use crate::Amount;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

pub const MAX_NAME_LENGTH: usize = 50;
pub const MIN_SYMBOL_LENGTH: usize = 2;
pub const MAX_SYMBOL_LENGTH: usize = 10;
pub const MAX_DECIMALS: u8 = 18;

/// Upper bound for a token's total supply (10^18 whole units).
pub fn max_total_supply() -> Amount {
    Amount::from_num(1_000_000_000_000_000_000u64)
}

/// One row of the balance table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub address: Address,
    pub contract_address: ContractAddress,
    pub balance: Amount,
}

/// A holder's position in one token, with the contract's display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub contract_address: ContractAddress,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenStatistics {
    pub total_contracts: usize,
    pub total_supply: Amount,
    pub average_decimals: f64,
    pub holders: usize,
}

/// Serializable form of the token ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenLedgerSnapshot {
    pub contracts: Vec<TokenContract>,
    pub balances: Vec<TokenBalance>,
}

#[derive(Debug, Clone, Default)]
pub struct TokenLedger {
    contracts: BTreeMap<ContractAddress, TokenContract>,
    symbols: HashMap<String, ContractAddress>,
    balances: HashMap<(Address, ContractAddress), Amount>,
    generator: ContractAddressGenerator,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generator(generator: ContractAddressGenerator) -> Self {
        TokenLedger {
            generator,
            ..Self::default()
        }
    }

    pub fn from_snapshot(snapshot: TokenLedgerSnapshot) -> Self {
        let mut ledger = TokenLedger::new();
        for contract in snapshot.contracts {
            ledger.generator.register(contract.contract_address.clone());
            ledger
                .symbols
                .insert(contract.symbol.clone(), contract.contract_address.clone());
            ledger
                .contracts
                .insert(contract.contract_address.clone(), contract);
        }
        for row in snapshot.balances {
            ledger
                .balances
                .insert((row.address, row.contract_address), row.balance);
        }
        ledger
    }

    pub fn snapshot(&self) -> TokenLedgerSnapshot {
        let mut balances: Vec<TokenBalance> = self
            .balances
            .iter()
            .map(|((address, contract_address), balance)| TokenBalance {
                address: address.clone(),
                contract_address: contract_address.clone(),
                balance: *balance,
            })
            .collect();
        balances.sort_by(|a, b| {
            (&a.contract_address, &a.address).cmp(&(&b.contract_address, &b.address))
        });

        TokenLedgerSnapshot {
            contracts: self.contracts.values().cloned().collect(),
            balances,
        }
    }

    /// Registers a new token and mints its whole supply to the creator.
    pub fn issue(
        &mut self,
        name: &str,
        symbol: &str,
        total_supply: Amount,
        decimals: u8,
        creator: &Address,
        now: u64,
    ) -> Result<TokenContract> {
        validate_token_parameters(name, symbol, total_supply, decimals)?;

        if let Some(existing) = self.symbols.get(symbol) {
            return Err(TokenError::new(
                TokenErrorCode::DuplicateSymbol,
                format!("Token symbol {} is already registered", symbol),
                json!({ "symbol": symbol, "contract_address": existing.as_str() }),
            )
            .into());
        }

        let contract_address = self.generator.generate(name, symbol, creator, now)?;
        if self.contracts.contains_key(&contract_address) {
            return Err(TokenError::new(
                TokenErrorCode::DuplicateContractAddress,
                format!("Contract address {} already exists", contract_address),
                json!({ "contract_address": contract_address.as_str() }),
            )
            .into());
        }

        let contract = TokenContract {
            name: name.to_string(),
            symbol: symbol.to_string(),
            total_supply,
            decimals,
            creator: creator.clone(),
            contract_address: contract_address.clone(),
            created_at: now,
        };

        self.symbols
            .insert(symbol.to_string(), contract_address.clone());
        self.contracts
            .insert(contract_address.clone(), contract.clone());
        self.credit(&contract_address, creator, total_supply)?;

        info!(
            "Issued token {} ({}) at {} with supply {} to {}",
            name, symbol, contract_address, total_supply, creator
        );
        Ok(contract)
    }

    /// Moves `amount` of a token between holders. Both sides change or neither does.
    pub fn transfer(
        &mut self,
        contract_address: &ContractAddress,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<()> {
        self.require_contract(contract_address)?;
        if amount == Amount::ZERO {
            return Err(ChainError::Validation(
                "Token transfer amount must be greater than zero".to_string(),
            ));
        }

        let available = self.balance_of(from, contract_address);
        if available < amount {
            return Err(insufficient_token_balance(contract_address, from, available, amount).into());
        }

        let recipient_balance = self.balance_of(to, contract_address);
        if from != to && recipient_balance.checked_add(amount).is_none() {
            return Err(ChainError::Validation(format!(
                "Token balance overflow for {} in {}",
                to, contract_address
            )));
        }

        self.debit(contract_address, from, amount);
        self.credit(contract_address, to, amount)?;
        Ok(())
    }

    fn credit(&mut self, contract_address: &ContractAddress, to: &Address, amount: Amount) -> Result<()> {
        let entry = self
            .balances
            .entry((to.clone(), contract_address.clone()))
            .or_insert(Amount::ZERO);
        *entry = entry.checked_add(amount).ok_or_else(|| {
            ChainError::Validation(format!("Token balance overflow for {} in {}", to, contract_address))
        })?;
        Ok(())
    }

    fn debit(&mut self, contract_address: &ContractAddress, from: &Address, amount: Amount) {
        let entry = self
            .balances
            .entry((from.clone(), contract_address.clone()))
            .or_insert(Amount::ZERO);
        let current = *entry;
        *entry = match current.checked_sub(amount) {
            Some(remaining) => remaining,
            None => {
                debug_assert!(
                    false,
                    "token debit below zero for {} in {}",
                    from, contract_address
                );
                warn!(
                    "Clamping token balance of {} in {} to zero (had {}, debit {})",
                    from, contract_address, current, amount
                );
                Amount::ZERO
            }
        };
    }

    pub fn balance_of(&self, address: &Address, contract_address: &ContractAddress) -> Amount {
        self.balances
            .get(&(address.clone(), contract_address.clone()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Every token the address holds a non-zero balance of.
    pub fn balances_of(&self, address: &Address) -> Vec<TokenHolding> {
        self.contracts
            .values()
            .filter_map(|contract| {
                let balance = self.balance_of(address, &contract.contract_address);
                (balance > Amount::ZERO).then(|| TokenHolding {
                    contract_address: contract.contract_address.clone(),
                    name: contract.name.clone(),
                    symbol: contract.symbol.clone(),
                    decimals: contract.decimals,
                    balance,
                })
            })
            .collect()
    }

    pub fn contract(&self, contract_address: &ContractAddress) -> Option<&TokenContract> {
        self.contracts.get(contract_address)
    }

    pub fn require_contract(&self, contract_address: &ContractAddress) -> Result<&TokenContract> {
        self.contracts.get(contract_address).ok_or_else(|| {
            TokenError::new(
                TokenErrorCode::TokenNotFound,
                format!("Token contract {} not found", contract_address),
                json!({ "contract_address": contract_address.as_str() }),
            )
            .into()
        })
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&TokenContract> {
        self.symbols
            .get(symbol)
            .and_then(|address| self.contracts.get(address))
    }

    /// All contracts, oldest first.
    pub fn all_contracts(&self) -> Vec<&TokenContract> {
        let mut contracts: Vec<&TokenContract> = self.contracts.values().collect();
        contracts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        contracts
    }

    /// Case-insensitive match on name, symbol or contract address.
    pub fn search(&self, query: &str) -> Vec<&TokenContract> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.all_contracts()
            .into_iter()
            .filter(|c| {
                c.name.to_lowercase().contains(&needle)
                    || c.symbol.to_lowercase().contains(&needle)
                    || c.contract_address.as_str().to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn statistics(&self) -> TokenStatistics {
        let total_contracts = self.contracts.len();
        let total_supply = self
            .contracts
            .values()
            .fold(Amount::ZERO, |acc, c| acc.saturating_add(c.total_supply));
        let average_decimals = if total_contracts == 0 {
            0.0
        } else {
            self.contracts.values().map(|c| c.decimals as f64).sum::<f64>() / total_contracts as f64
        };
        let holders = self
            .balances
            .iter()
            .filter(|(_, balance)| **balance > Amount::ZERO)
            .map(|((address, _), _)| address)
            .collect::<std::collections::HashSet<_>>()
            .len();

        TokenStatistics {
            total_contracts,
            total_supply,
            average_decimals,
            holders,
        }
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

pub(crate) fn insufficient_token_balance(
    contract_address: &ContractAddress,
    holder: &Address,
    available: Amount,
    required: Amount,
) -> TokenError {
    TokenError::new(
        TokenErrorCode::InsufficientTokenBalance,
        format!(
            "Insufficient balance of {} for {}: available {}, required {}",
            contract_address, holder, available, required
        ),
        json!({
            "contract_address": contract_address.as_str(),
            "address": holder.as_str(),
            "available": available.to_string(),
            "required": required.to_string(),
        }),
    )
}

fn invalid_parameters(message: String, details: serde_json::Value) -> ChainError {
    TokenError::new(TokenErrorCode::InvalidTokenParameters, message, details).into()
}

pub fn validate_token_parameters(
    name: &str,
    symbol: &str,
    total_supply: Amount,
    decimals: u8,
) -> Result<()> {
    if name.is_empty()
        || name.chars().count() > MAX_NAME_LENGTH
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ')
        || name.trim().is_empty()
    {
        return Err(invalid_parameters(
            format!(
                "Token name must be 1-{} alphanumeric characters or spaces, got '{}'",
                MAX_NAME_LENGTH, name
            ),
            json!({ "field": "name", "value": name }),
        ));
    }

    if symbol.len() < MIN_SYMBOL_LENGTH
        || symbol.len() > MAX_SYMBOL_LENGTH
        || !symbol.chars().all(|c| c.is_ascii_uppercase())
    {
        return Err(invalid_parameters(
            format!(
                "Token symbol must be {}-{} uppercase letters, got '{}'",
                MIN_SYMBOL_LENGTH, MAX_SYMBOL_LENGTH, symbol
            ),
            json!({ "field": "symbol", "value": symbol }),
        ));
    }

    if total_supply == Amount::ZERO || total_supply > max_total_supply() {
        return Err(invalid_parameters(
            format!(
                "Total supply must be greater than zero and at most {}, got {}",
                max_total_supply(),
                total_supply
            ),
            json!({ "field": "total_supply", "value": total_supply.to_string() }),
        ));
    }

    if decimals > MAX_DECIMALS {
        return Err(invalid_parameters(
            format!("Decimals must be at most {}, got {}", MAX_DECIMALS, decimals),
            json!({ "field": "decimals", "value": decimals }),
        ));
    }

    Ok(())
}
