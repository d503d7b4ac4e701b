#![forbid(unsafe_code)]
//! PSNChain node: opens the configured store and serves the ledger from one process

use clap::{Parser, Subcommand};
use psnchain::config::{load_config, DEFAULT_CONFIG_PATH};
use psnchain::crypto::Address;
use psnchain::node::Node;
use psnchain::transaction::Transaction;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the node, mining pending transactions when the miner is enabled
    Run,
    /// Prints chain height, difficulty and pool size
    Status,
    /// Seals one block from the pending pool
    Mine {
        /// Address that receives the reward; defaults to the configured beneficiary
        #[arg(long)]
        recipient: Option<Address>,
    },
    /// Prints native and token balances for an address
    Balance { address: Address },
    /// Submits a signed transaction read from a JSON file
    Submit { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let node = Arc::new(Node::open(&config)?);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let miner = match (config.miner.enabled, config.miner.beneficiary_address.clone()) {
                (true, Some(beneficiary)) => {
                    let worker = Arc::clone(&node);
                    let interval = Duration::from_secs(config.miner.interval_secs);
                    Some(tokio::spawn(async move {
                        worker.run_miner(beneficiary, interval).await;
                    }))
                }
                _ => {
                    info!("Miner disabled; serving the ledger only");
                    None
                }
            };

            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            node.shutdown();
            if let Some(handle) = miner {
                if let Err(e) = handle.await {
                    warn!("Miner task ended abnormally: {}", e);
                }
            }
        }
        Commands::Status => {
            let ledger = node.ledger();
            let ledger = ledger.read().await;
            println!("height:     {}", ledger.height());
            println!("difficulty: {}", ledger.difficulty());
            println!("reward:     {}", ledger.mining_reward());
            println!("pending:    {}", ledger.pending_count());
            println!("tokens:     {}", ledger.tokens().len());
            println!("pools:      {}", ledger.pools().len());
            println!("valid:      {}", ledger.is_valid());
        }
        Commands::Mine { recipient } => {
            let recipient = recipient
                .or(config.miner.beneficiary_address)
                .ok_or("no --recipient given and miner.beneficiary_address is not set")?;
            let block = node.mine_block(&recipient).await?;
            println!("{}", serde_json::to_string_pretty(&block)?);
        }
        Commands::Balance { address } => {
            let balances = node.balances(&address).await;
            println!("{}", serde_json::to_string_pretty(&balances)?);
        }
        Commands::Submit { file } => {
            let contents = std::fs::read_to_string(&file)?;
            let tx: Transaction = serde_json::from_str(&contents)?;
            let hash = node.submit_transaction(tx).await?;
            println!("{}", hash);
        }
    }

    Ok(())
}
