/// Token contracts and contract-address issuance
use crate::crypto::{sha256_hex, Address};
use crate::error::{ChainError, TokenError, TokenErrorCode};
use crate::Amount;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub const CONTRACT_PREFIX: &str = "PSN";
pub const CONTRACT_HEX_LENGTH: usize = 40;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// A token contract address: `PSN` followed by 40 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractAddress(String);

impl ContractAddress {
    pub fn parse(s: &str) -> Result<Self, TokenError> {
        let valid = s
            .strip_prefix(CONTRACT_PREFIX)
            .map(|hex_part| {
                hex_part.len() == CONTRACT_HEX_LENGTH
                    && hex_part.chars().all(|c| c.is_ascii_hexdigit())
            })
            .unwrap_or(false);

        if !valid {
            return Err(TokenError::new(
                TokenErrorCode::InvalidContractAddress,
                format!("Invalid contract address format: {}", s),
                json!({ "address": s, "expected": "PSN followed by 40 hex characters" }),
            ));
        }
        Ok(ContractAddress(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContractAddress {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ContractAddress::parse(s)?)
    }
}

impl TryFrom<String> for ContractAddress {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ContractAddress::parse(&value)
    }
}

impl From<ContractAddress> for String {
    fn from(address: ContractAddress) -> Self {
        address.0
    }
}

/// An issued token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenContract {
    pub name: String,
    pub symbol: String,
    pub total_supply: Amount,
    pub decimals: u8,
    pub creator: Address,
    pub contract_address: ContractAddress,
    pub created_at: u64,
}

/// Hands out contract addresses that have never been used before.
#[derive(Debug, Clone)]
pub struct ContractAddressGenerator {
    used: HashSet<ContractAddress>,
    max_attempts: u32,
}

impl Default for ContractAddressGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractAddressGenerator {
    pub fn new() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        ContractAddressGenerator {
            used: HashSet::new(),
            max_attempts,
        }
    }

    /// Marks an address as taken, e.g. when restoring persisted contracts.
    pub fn register(&mut self, address: ContractAddress) {
        self.used.insert(address);
    }

    pub fn is_used(&self, address: &ContractAddress) -> bool {
        self.used.contains(address)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Derives a fresh address from the token parameters plus random entropy.
    pub fn generate(
        &mut self,
        name: &str,
        symbol: &str,
        creator: &Address,
        timestamp: u64,
    ) -> Result<ContractAddress, TokenError> {
        for attempt in 0..self.max_attempts {
            let mut entropy = [0u8; 16];
            OsRng.fill_bytes(&mut entropy);

            let seed = format!(
                "{}|{}|{}|{}|{}|{}",
                name,
                symbol,
                creator,
                timestamp,
                attempt,
                hex::encode(entropy)
            );
            let digest = sha256_hex(seed.as_bytes());
            let candidate = ContractAddress(format!(
                "{}{}",
                CONTRACT_PREFIX,
                &digest[..CONTRACT_HEX_LENGTH]
            ));

            if self.used.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }

        Err(TokenError::new(
            TokenErrorCode::AddressSpaceExhausted,
            "Failed to generate a unique contract address",
            json!({
                "max_attempts": self.max_attempts,
                "name": name,
                "symbol": symbol,
                "creator": creator.as_str(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_address_format() {
        let mut generator = ContractAddressGenerator::new();
        let creator = Address::from_label("creator");
        let address = generator.generate("Gold", "GLD", &creator, 1).unwrap();

        assert!(address.as_str().starts_with(CONTRACT_PREFIX));
        assert_eq!(address.as_str().len(), CONTRACT_PREFIX.len() + CONTRACT_HEX_LENGTH);
        assert!(ContractAddress::parse(address.as_str()).is_ok());
        assert!(generator.is_used(&address));
    }

    #[test]
    fn test_parse_rejects_wallet_namespace() {
        let wallet = Address::from_label("someone");
        let err = ContractAddress::parse(wallet.as_str()).unwrap_err();
        assert_eq!(err.code, TokenErrorCode::InvalidContractAddress);
        assert!(ContractAddress::parse("PSN1234").is_err());
        assert!(ContractAddress::parse("PSNzz23456789abcdef0123456789abcdef01234567").is_err());
    }

    #[test]
    fn test_same_inputs_still_unique() {
        let mut generator = ContractAddressGenerator::new();
        let creator = Address::from_label("creator");
        let a = generator.generate("Gold", "GLD", &creator, 42).unwrap();
        let b = generator.generate("Gold", "GLD", &creator, 42).unwrap();
        assert_ne!(a, b);
        assert_eq!(generator.len(), 2);
    }

    #[test]
    fn test_exhausted_attempts_is_checked() {
        let mut generator = ContractAddressGenerator::with_max_attempts(0);
        let creator = Address::from_label("creator");
        let err = generator.generate("Gold", "GLD", &creator, 1).unwrap_err();
        assert_eq!(err.code, TokenErrorCode::AddressSpaceExhausted);
        assert_eq!(err.details["max_attempts"], 0);
    }
}
