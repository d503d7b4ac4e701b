//! Error types for PSNChain

use crate::Amount;
use serde::Serialize;
use thiserror::Error;

/// Coarse error classes a request layer maps to user-facing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Signature,
    InsufficientBalance,
    NotFound,
    DuplicateResource,
    ChainIntegrity,
    Cancelled,
    Internal,
}

/// Machine-readable codes carried by every token or contract failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenErrorCode {
    InvalidContractAddress,
    TokenNotFound,
    InsufficientTokenBalance,
    InsufficientGasBalance,
    DuplicateSymbol,
    DuplicateContractAddress,
    AddressSpaceExhausted,
    InvalidTokenParameters,
    InvalidGasPrice,
}

impl TokenErrorCode {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenErrorCode::InvalidContractAddress
            | TokenErrorCode::InvalidTokenParameters
            | TokenErrorCode::InvalidGasPrice => ErrorKind::Validation,
            TokenErrorCode::TokenNotFound => ErrorKind::NotFound,
            TokenErrorCode::InsufficientTokenBalance | TokenErrorCode::InsufficientGasBalance => {
                ErrorKind::InsufficientBalance
            }
            TokenErrorCode::DuplicateSymbol
            | TokenErrorCode::DuplicateContractAddress
            | TokenErrorCode::AddressSpaceExhausted => ErrorKind::DuplicateResource,
        }
    }
}

/// A token/contract failure with a structured detail payload.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TokenError {
    pub code: TokenErrorCode,
    pub message: String,
    pub details: serde_json::Value,
}

impl TokenError {
    pub fn new(code: TokenErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Signature error: {0}")]
    Signature(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Amount, required: Amount },
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("Duplicate {kind}: {id}")]
    DuplicateResource { kind: &'static str, id: String },
    #[error("Chain integrity error at block {index}: {reason}")]
    ChainIntegrity { index: u64, reason: String },
    #[error("Token error [{:?}]: {}", .0.code, .0.message)]
    Token(#[from] TokenError),
    #[error("Block sealing was cancelled")]
    SealingCancelled,
    #[error("Stale candidate block: {0}")]
    StaleCandidate(String),
    #[error("Mempool is full")]
    MempoolFull,
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Worker error: {0}")]
    Worker(String),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::Validation(_) | ChainError::Config(_) => ErrorKind::Validation,
            ChainError::Signature(_) | ChainError::InvalidKey(_) => ErrorKind::Signature,
            ChainError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            ChainError::NotFound { .. } => ErrorKind::NotFound,
            ChainError::DuplicateResource { .. } => ErrorKind::DuplicateResource,
            ChainError::ChainIntegrity { .. } => ErrorKind::ChainIntegrity,
            ChainError::Token(err) => err.code.kind(),
            ChainError::SealingCancelled | ChainError::StaleCandidate(_) => ErrorKind::Cancelled,
            ChainError::MempoolFull
            | ChainError::Database(_)
            | ChainError::Io(_)
            | ChainError::Serialization(_)
            | ChainError::Worker(_) => ErrorKind::Internal,
        }
    }

    /// Machine code for token failures, `None` for everything else.
    pub fn token_code(&self) -> Option<TokenErrorCode> {
        match self {
            ChainError::Token(err) => Some(err.code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::Database(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_error_maps_to_kind() {
        let err: ChainError = TokenError::new(
            TokenErrorCode::InsufficientTokenBalance,
            "Insufficient token balance",
            json!({ "available": "1", "required": "5" }),
        )
        .into();

        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(err.token_code(), Some(TokenErrorCode::InsufficientTokenBalance));
        assert!(err.to_string().contains("InsufficientTokenBalance"));
    }

    #[test]
    fn test_token_code_serializes_as_machine_code() {
        let code = serde_json::to_string(&TokenErrorCode::AddressSpaceExhausted).unwrap();
        assert_eq!(code, "\"ADDRESS_SPACE_EXHAUSTED\"");
    }

    #[test]
    fn test_chain_error_kinds() {
        assert_eq!(ChainError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(ChainError::SealingCancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            ChainError::NotFound { kind: "pool", id: "p".into() }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(ChainError::Database("x".into()).token_code(), None);
    }
}
