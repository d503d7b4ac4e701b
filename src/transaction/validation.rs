/// Stateless validation for transactions, separated from type definitions
use crate::crypto::{verify_signature, Address};
use crate::error::{ChainError, TokenError, TokenErrorCode};
use crate::transaction::types::Transaction;
use crate::Amount;
use serde_json::json;

impl Transaction {
    /// Sender and recipient present, positive amount.
    pub fn validate_fields(&self) -> Result<(), ChainError> {
        if self.sender.is_none() {
            return Err(ChainError::Validation(
                "Sender is required; mint transactions cannot be submitted".to_string(),
            ));
        }
        if self.recipient.as_str().is_empty() {
            return Err(ChainError::Validation("Recipient is required".to_string()));
        }
        if self.amount == Amount::ZERO {
            return Err(ChainError::Validation(
                "Transaction amount must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The stored fee must match the schedule; token transfers must pay something.
    pub fn validate_gas(&self) -> Result<(), ChainError> {
        let expected = self.expected_gas_fee();
        if self.gas_fee != expected {
            return Err(ChainError::Validation(format!(
                "Gas fee mismatch: transaction declares {}, schedule requires {}",
                self.gas_fee, expected
            )));
        }
        if self.is_token_transfer() && self.gas_fee == Amount::ZERO {
            return Err(TokenError::new(
                TokenErrorCode::InvalidGasPrice,
                "Token transfers must carry a positive gas price",
                json!({ "gas_price": self.gas_price.to_string() }),
            )
            .into());
        }
        Ok(())
    }

    pub fn validate_hash(&self) -> Result<(), ChainError> {
        let computed = self.compute_hash();
        if computed != self.tx_hash {
            return Err(ChainError::Validation(format!(
                "Transaction hash mismatch: stored {}, computed {}",
                self.tx_hash, computed
            )));
        }
        Ok(())
    }

    /// Checks the signature and that the signing key belongs to the sender.
    /// Mint transactions carry no signature and pass trivially.
    pub fn validate_signature(&self) -> Result<(), ChainError> {
        let sender = match &self.sender {
            Some(sender) => sender,
            None => return Ok(()),
        };

        let (signature, public_key) = match (&self.signature, &self.public_key) {
            (Some(sig), Some(pk)) => (sig, pk),
            _ => {
                return Err(ChainError::Signature(
                    "Transaction not signed".to_string(),
                ))
            }
        };

        let signer = Address::from_public_key(public_key);
        if &signer != sender {
            return Err(ChainError::Signature(format!(
                "Public key belongs to {}, not to sender {}",
                signer, sender
            )));
        }

        verify_signature(public_key, &self.signable_message(), signature)
    }

    /// Everything that can be checked without chain or token state.
    pub fn validate(&self) -> Result<(), ChainError> {
        self.validate_fields()?;
        self.validate_gas()?;
        self.validate_size()?;
        self.validate_hash()?;
        self.validate_signature()
    }

    /// Checks applied to a sealed mint transaction.
    pub fn validate_mint(&self) -> Result<(), ChainError> {
        if !self.is_mint() {
            return Err(ChainError::Validation(
                "Expected a mint transaction".to_string(),
            ));
        }
        if self.amount == Amount::ZERO {
            return Err(ChainError::Validation(
                "Mint amount must be greater than zero".to_string(),
            ));
        }
        if self.token_contract.is_some() || self.gas_fee != Amount::ZERO {
            return Err(ChainError::Validation(
                "Mint transactions carry native currency and no gas".to_string(),
            ));
        }
        if self.signature.is_some() {
            return Err(ChainError::Validation(
                "Mint transactions must not be signed".to_string(),
            ));
        }
        self.validate_hash()
    }
}
