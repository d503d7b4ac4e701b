//! Integration tests for wallet creation and transaction handling

use psnchain::crypto::Address;
use psnchain::error::ChainError;
use psnchain::transaction::Transaction;
use psnchain::wallet::{verify_for_address, Wallet};
use psnchain::Amount;
use tempfile::TempDir;

/// Helper to build a signed native transfer from `wallet`
fn signed_transfer(wallet: &Wallet, to: &Address, amount: u64) -> Result<Transaction, Box<dyn std::error::Error>> {
    let mut tx = Transaction::native(wallet.address.clone(), to.clone(), Amount::from_num(amount), Amount::ONE);
    wallet.sign_transaction(&mut tx)?;
    Ok(tx)
}

#[test]
fn test_wallet_creation() -> Result<(), Box<dyn std::error::Error>> {
    let wallet = Wallet::generate();

    let address = wallet.address.as_str();
    assert_eq!(address.len(), 43);
    assert!(address.starts_with("psn"));
    assert!(address[3..]
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    assert_eq!(wallet.secret_key_hex.len(), 64);
    assert_eq!(Address::from_public_key(&wallet.public_key_bytes()?), wallet.address);

    Ok(())
}

#[test]
fn test_create_two_wallets() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();

    assert_ne!(alice.address, bob.address);
    assert_ne!(alice.secret_key_hex, bob.secret_key_hex);
}

#[test]
fn test_wallet_persistence() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let wallet_path = temp_dir.path().join("wallet.json");

    let original = Wallet::generate();
    std::fs::write(&wallet_path, serde_json::to_string_pretty(&original)?)?;

    let loaded: Wallet = serde_json::from_str(&std::fs::read_to_string(&wallet_path)?)?;
    assert_eq!(loaded.address, original.address);
    assert_eq!(loaded.secret_key_hex, original.secret_key_hex);

    // The restored key still signs for the same address.
    let tx = signed_transfer(&loaded, &Address::from_label("bob"), 5)?;
    tx.validate()?;

    Ok(())
}

#[test]
fn test_signed_transaction_validates() -> Result<(), Box<dyn std::error::Error>> {
    let alice = Wallet::generate();
    let tx = signed_transfer(&alice, &Address::from_label("bob"), 50)?;

    tx.validate()?;
    assert_eq!(tx.tx_hash, tx.compute_hash());
    assert!(tx.gas_fee > Amount::ZERO);
    assert_eq!(tx.native_cost(), Some(Amount::from_num(50) + tx.gas_fee));

    Ok(())
}

#[test]
fn test_mutated_transaction_fails() -> Result<(), Box<dyn std::error::Error>> {
    let alice = Wallet::generate();
    let tx = signed_transfer(&alice, &Address::from_label("bob"), 50)?;

    let mut amount_changed = tx.clone();
    amount_changed.amount = Amount::from_num(5_000);
    assert!(amount_changed.validate().is_err());

    let mut resigned_hash = amount_changed.clone();
    resigned_hash.tx_hash = resigned_hash.compute_hash();
    assert!(matches!(resigned_hash.validate(), Err(ChainError::Signature(_))));

    let mut signature_flipped = tx;
    if let Some(signature) = signature_flipped.signature.as_mut() {
        signature[0] ^= 0xff;
    }
    assert!(matches!(signature_flipped.validate(), Err(ChainError::Signature(_))));

    Ok(())
}

#[test]
fn test_wallet_refuses_foreign_sender() {
    let alice = Wallet::generate();
    let mallory = Wallet::generate();
    let mut tx = Transaction::native(
        alice.address.clone(),
        Address::from_label("bob"),
        Amount::from_num(1),
        Amount::ZERO,
    );

    assert!(matches!(
        mallory.sign_transaction(&mut tx),
        Err(ChainError::Signature(_))
    ));
    assert!(tx.signature.is_none());
}

#[test]
fn test_payload_signature_bound_to_address() -> Result<(), Box<dyn std::error::Error>> {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let payload = serde_json::json!({ "action": "balance/get", "nonce": 7 });

    let signature = alice.sign_payload(&payload)?;
    let alice_pk = alice.public_key_bytes()?;

    assert!(verify_for_address(&payload, &signature, &alice_pk, &alice.address));
    assert!(!verify_for_address(&payload, &signature, &alice_pk, &bob.address));

    Ok(())
}
