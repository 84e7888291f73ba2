use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "wallet-bridge",
    about = "Dry-run driver for the wallet session relay",
    author,
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Comma-separated chain ids offered to dApps (overrides WALLET_BRIDGE_CHAINS).
    #[arg(long, global = true)]
    pub chains: Option<String>,

    /// Address the dry-run signer signs as.
    #[arg(
        long,
        global = true,
        env = "WALLET_BRIDGE_ADDRESS",
        default_value = "0x0000000000000000000000000000000000000001"
    )]
    pub address: String,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info,relay_engine=debug")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Feed a JSON-lines script of session events and user actions through
    /// the relay, printing each outcome.
    Replay {
        /// Script file, one step per line. Blank lines and `#` comments are skipped.
        script: PathBuf,
        /// Chain the wallet starts on.
        #[arg(long, default_value_t = 1)]
        active_chain: u64,
        /// Print prometheus counters after the run.
        #[arg(long)]
        metrics: bool,
    },
    /// Print the namespaces that would be approved for a session proposal.
    Namespaces {
        /// JSON file holding a session proposal.
        proposal: PathBuf,
    },
}
