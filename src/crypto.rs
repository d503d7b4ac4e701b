//! Cryptographic primitives for PSNChain

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Human-facing prefix of every wallet address.
pub const ADDRESS_PREFIX: &str = "psn";
/// Number of hex characters following the prefix.
pub const ADDRESS_HEX_LENGTH: usize = 40;

/// SHA-256 digest rendered as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A wallet address: `psn` followed by 40 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parses and validates an address string.
    pub fn parse(s: &str) -> Result<Self, ChainError> {
        let hex_part = s.strip_prefix(ADDRESS_PREFIX).ok_or_else(|| {
            ChainError::Validation(format!(
                "Address must start with '{}', got '{}'",
                ADDRESS_PREFIX, s
            ))
        })?;
        if hex_part.len() != ADDRESS_HEX_LENGTH {
            return Err(ChainError::Validation(format!(
                "Address must have {} hex characters after the prefix, got {}",
                ADDRESS_HEX_LENGTH,
                hex_part.len()
            )));
        }
        if !hex_part
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(ChainError::Validation(format!(
                "Address must be lowercase hex after the prefix, got '{}'",
                s
            )));
        }
        Ok(Address(s.to_string()))
    }

    /// Derives the address of a compressed public key: prefix + first 40 hex chars of its SHA-256.
    pub fn from_public_key(public_key_bytes: &[u8]) -> Self {
        let digest = sha256_hex(public_key_bytes);
        Address(format!("{}{}", ADDRESS_PREFIX, &digest[..ADDRESS_HEX_LENGTH]))
    }

    /// Deterministic address derived from an arbitrary label. Useful for tests and tooling.
    pub fn from_label(label: &str) -> Self {
        let digest = sha256_hex(label.as_bytes());
        Address(format!("{}{}", ADDRESS_PREFIX, &digest[..ADDRESS_HEX_LENGTH]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    /// Creates a KeyPair from an existing SecretKey.
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::InvalidKey(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::InvalidKey(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Creates a KeyPair from a hex-encoded secret key.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(secret_hex)
            .map_err(|e| ChainError::InvalidKey(format!("Invalid secret key hex: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    /// The wallet address controlled by this key pair.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key_bytes())
    }

    /// Returns the KeyPair's public key as a compressed byte array.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Signs a message (which is first hashed using SHA-256) and returns the compact signature bytes.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE], ChainError> {
        let digest = Sha256::digest(message);

        let message = Message::from_digest_slice(&digest)
            .map_err(|e| ChainError::Signature(format!("Failed to create message: {}", e)))?;

        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_compact())
    }
}

/// Verifies an ECDSA signature given the raw public key bytes, message, and signature bytes.
pub fn verify_signature(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::InvalidKey(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::Signature(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| ChainError::InvalidKey(format!("Invalid public key: {}", e)))?;

    let digest = Sha256::digest(message);
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| ChainError::Signature(format!("Failed to create message: {}", e)))?;

    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| ChainError::Signature(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::Signature("Signature verification failed".to_string()))
}
