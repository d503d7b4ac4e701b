#![forbid(unsafe_code)]
//! PSNChain wallet tool: key generation and offline transaction signing

use clap::{Parser, Subcommand};
use psnchain::crypto::Address;
use psnchain::token::ContractAddress;
use psnchain::transaction::Transaction;
use psnchain::wallet::Wallet;
use psnchain::Amount;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generates a new key pair and prints it as JSON
    New,
    /// Prints the address and public key for a secret key
    Inspect {
        #[arg(long)]
        secret: String,
    },
    /// Builds and signs a transfer, printing the transaction as JSON
    Transfer {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        to: Address,
        #[arg(long)]
        amount: Amount,
        /// Gas price multiplier; token transfers need a positive value
        #[arg(long, default_value = "1")]
        gas_price: Amount,
        /// Token contract address for a token transfer
        #[arg(long)]
        contract: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    match Cli::parse().command.unwrap_or(Commands::New) {
        Commands::New => {
            println!("{}", serde_json::to_string_pretty(&Wallet::generate())?);
        }
        Commands::Inspect { secret } => {
            let wallet = Wallet::from_secret_hex(&secret)?;
            println!("address:    {}", wallet.address);
            println!("public key: {}", wallet.public_key_hex);
        }
        Commands::Transfer {
            secret,
            to,
            amount,
            gas_price,
            contract,
        } => {
            let wallet = Wallet::from_secret_hex(&secret)?;
            let mut tx = match contract {
                Some(contract) => {
                    Transaction::token(wallet.address.clone(), to, ContractAddress::parse(&contract)?, amount, gas_price)
                }
                None => Transaction::native(wallet.address.clone(), to, amount, gas_price),
            };
            wallet.sign_transaction(&mut tx)?;
            println!("{}", serde_json::to_string_pretty(&tx)?);
        }
    }

    Ok(())
}
