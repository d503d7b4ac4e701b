//! Wallet key generation and payload signing
//!
//! A wallet is a secp256k1 key pair plus the `psn` address derived from its
//! compressed public key. Arbitrary payloads are signed over their canonical
//! JSON form; transactions are signed over their signable message.

use crate::crypto::{verify_signature, Address, KeyPair};
use crate::error::{ChainError, Result};
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub address: Address,
    pub public_key_hex: String,
    pub secret_key_hex: String,
    pub created: DateTime<Utc>,
}

impl Wallet {
    /// Generates a fresh key pair and its address.
    pub fn generate() -> Self {
        Self::from_keypair(&KeyPair::generate())
    }

    /// Restores a wallet from a hex-encoded secret key.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let keypair = KeyPair::from_secret_hex(secret_hex)?;
        Ok(Self::from_keypair(&keypair))
    }

    fn from_keypair(keypair: &KeyPair) -> Self {
        Wallet {
            address: keypair.address(),
            public_key_hex: hex::encode(keypair.public_key_bytes()),
            secret_key_hex: keypair.secret_key_hex(),
            created: Utc::now(),
        }
    }

    pub fn keypair(&self) -> Result<KeyPair> {
        KeyPair::from_secret_hex(&self.secret_key_hex)
    }

    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.public_key_hex)
            .map_err(|e| ChainError::InvalidKey(format!("Invalid public key hex: {}", e)))
    }

    /// Signs a transaction in place. The transaction's sender must be this wallet.
    pub fn sign_transaction(&self, tx: &mut Transaction) -> Result<()> {
        match &tx.sender {
            Some(sender) if sender == &self.address => {}
            Some(sender) => {
                return Err(ChainError::Signature(format!(
                    "Wallet {} cannot sign for sender {}",
                    self.address, sender
                )))
            }
            None => {
                return Err(ChainError::Signature(
                    "Mint transactions are not signed".to_string(),
                ))
            }
        }
        tx.sign_with(&self.keypair()?)
    }

    /// Signs the canonical JSON form of any serializable payload.
    pub fn sign_payload<T: Serialize>(&self, payload: &T) -> Result<Vec<u8>> {
        let message = canonical_bytes(payload)?;
        let signature = self.keypair()?.sign(&message)?;
        Ok(signature.to_vec())
    }
}

fn canonical_bytes<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    // serde_json::Value keeps object keys sorted, so the byte form is stable
    let value = serde_json::to_value(payload)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Checks a payload signature against a public key. Any malformed input yields `false`.
pub fn verify_payload<T: Serialize>(payload: &T, signature: &[u8], public_key: &[u8]) -> bool {
    match canonical_bytes(payload) {
        Ok(message) => verify_signature(public_key, &message, signature).is_ok(),
        Err(_) => false,
    }
}

/// Like [`verify_payload`], but also requires the public key to belong to `address`.
pub fn verify_for_address<T: Serialize>(
    payload: &T,
    signature: &[u8],
    public_key: &[u8],
    address: &Address,
) -> bool {
    Address::from_public_key(public_key) == *address && verify_payload(payload, signature, public_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_wallet_restores_from_secret() {
        let wallet = Wallet::generate();
        let restored = Wallet::from_secret_hex(&wallet.secret_key_hex).unwrap();
        assert_eq!(wallet.address, restored.address);
        assert_eq!(wallet.public_key_hex, restored.public_key_hex);
    }

    #[test]
    fn test_malformed_secret_is_invalid_key() {
        let result = Wallet::from_secret_hex("not-hex");
        assert!(matches!(result, Err(ChainError::InvalidKey(_))));
    }

    #[test]
    fn test_payload_sign_and_verify() {
        let wallet = Wallet::generate();
        let payload = json!({ "to": "psn00", "amount": "50" });
        let signature = wallet.sign_payload(&payload).unwrap();
        let pk = wallet.public_key_bytes().unwrap();

        assert!(verify_payload(&payload, &signature, &pk));
        assert!(verify_for_address(&payload, &signature, &pk, &wallet.address));

        let mutated = json!({ "to": "psn00", "amount": "51" });
        assert!(!verify_payload(&mutated, &signature, &pk));

        let mut bad_sig = signature.clone();
        bad_sig[10] ^= 0x01;
        assert!(!verify_payload(&payload, &bad_sig, &pk));
    }

    #[test]
    fn test_verify_for_other_address_fails() {
        let wallet = Wallet::generate();
        let other = Wallet::generate();
        let payload = json!({ "n": 1 });
        let signature = wallet.sign_payload(&payload).unwrap();
        let pk = wallet.public_key_bytes().unwrap();
        assert!(!verify_for_address(&payload, &signature, &pk, &other.address));
    }
}
