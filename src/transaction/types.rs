/// Transaction types for PSNChain
use crate::crypto::{sha256_hex, Address, KeyPair};
use crate::error::ChainError;
use crate::token::{ContractAddress, GasSchedule, TransactionType};
use crate::Amount;
use serde::{Deserialize, Serialize};

/// Maximum transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

const SIGNING_DOMAIN: &[u8] = b"PSN-TX:";

/// A value transfer. `sender == None` marks minted value (genesis allocation or block reward).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Option<Address>,
    pub recipient: Address,
    pub amount: Amount,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    #[serde(default)]
    pub token_contract: Option<ContractAddress>,
    /// Multiplier applied to the gas schedule
    pub gas_price: Amount,
    pub gas_fee: Amount,
    pub tx_hash: String,
    #[serde(default)]
    pub signature: Option<Vec<u8>>,
    #[serde(default)]
    pub public_key: Option<Vec<u8>>,
}

impl Transaction {
    /// Unsigned native-currency transfer; gas price 0 makes it fee-free.
    pub fn native(sender: Address, recipient: Address, amount: Amount, gas_price: Amount) -> Self {
        Self::build(Some(sender), recipient, amount, None, gas_price, now_millis())
    }

    /// Unsigned token transfer. The fee is still paid in native currency.
    pub fn token(
        sender: Address,
        recipient: Address,
        contract: ContractAddress,
        amount: Amount,
        gas_price: Amount,
    ) -> Self {
        Self::build(Some(sender), recipient, amount, Some(contract), gas_price, now_millis())
    }

    /// Minted value with no sender. Never signed and never charged gas.
    pub fn mint(recipient: Address, amount: Amount, timestamp: u64) -> Self {
        Self::build(None, recipient, amount, None, Amount::ZERO, timestamp)
    }

    /// Builds a transaction with an explicit timestamp, deriving its fee and hash.
    pub fn build(
        sender: Option<Address>,
        recipient: Address,
        amount: Amount,
        token_contract: Option<ContractAddress>,
        gas_price: Amount,
        timestamp: u64,
    ) -> Self {
        let mut tx = Transaction {
            sender,
            recipient,
            amount,
            timestamp,
            token_contract,
            gas_price,
            gas_fee: Amount::ZERO,
            tx_hash: String::new(),
            signature: None,
            public_key: None,
        };
        tx.gas_fee = tx.expected_gas_fee();
        tx.tx_hash = tx.compute_hash();
        tx
    }

    pub fn is_mint(&self) -> bool {
        self.sender.is_none()
    }

    pub fn is_token_transfer(&self) -> bool {
        self.token_contract.is_some()
    }

    pub fn transaction_type(&self) -> TransactionType {
        if self.token_contract.is_some() {
            TransactionType::TokenTransfer
        } else {
            TransactionType::NativeTransfer
        }
    }

    /// Stable byte form covering every signed field.
    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(SIGNING_DOMAIN);
        match &self.sender {
            Some(sender) => {
                message.push(1);
                message.extend_from_slice(sender.as_str().as_bytes());
            }
            None => message.push(0),
        }
        message.extend_from_slice(self.recipient.as_str().as_bytes());
        message.extend_from_slice(&self.amount.to_bits().to_le_bytes());
        message.extend_from_slice(&self.timestamp.to_le_bytes());
        match &self.token_contract {
            Some(contract) => {
                message.push(1);
                message.extend_from_slice(contract.as_str().as_bytes());
            }
            None => message.push(0),
        }
        message.extend_from_slice(&self.gas_price.to_bits().to_le_bytes());
        message.push(self.transaction_type().tag());
        message
    }

    pub fn compute_hash(&self) -> String {
        sha256_hex(&self.signable_message())
    }

    /// Gas fee implied by the schedule, the payload size and the gas price.
    pub fn expected_gas_fee(&self) -> Amount {
        if self.is_mint() {
            return Amount::ZERO;
        }
        GasSchedule::STANDARD.priced_fee(
            self.transaction_type(),
            self.signable_message().len(),
            self.gas_price,
        )
    }

    /// Native currency the sender gives up: amount (native only) plus gas.
    pub fn native_cost(&self) -> Option<Amount> {
        if self.is_token_transfer() {
            Some(self.gas_fee)
        } else {
            self.amount.checked_add(self.gas_fee)
        }
    }

    pub fn sign(&mut self, signature: Vec<u8>, public_key: Vec<u8>) {
        self.signature = Some(signature);
        self.public_key = Some(public_key);
    }

    pub fn sign_with(&mut self, keypair: &KeyPair) -> Result<(), ChainError> {
        let signature = keypair.sign(&self.signable_message())?;
        self.sign(signature.to_vec(), keypair.public_key_bytes().to_vec());
        Ok(())
    }

    /// Validate transaction size to prevent DoS attacks
    pub fn validate_size(&self) -> Result<(), ChainError> {
        let serialized = bincode::serialize(self)?;

        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(ChainError::Validation(format!(
                "Transaction too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }
}

pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
