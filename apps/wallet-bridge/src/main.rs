mod cli;
mod dry_run;
mod replay;

use std::fs;
use std::io::Write as _;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bridge_proto::{ChainId, Participant, SessionProposal};
use clap::Parser;
use relay_engine::{
    build_approved_namespaces, config::parse_chain_list, event_channel, metrics,
    InMemorySessionManager, RelayConfig, RelayController,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::dry_run::DryRunSigner;

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = cli::Cli::parse();
    init_tracing(&cli.log_filter)?;
    run(cli).await
}

fn relay_config(chains: Option<&str>) -> Result<RelayConfig> {
    let mut config = RelayConfig::from_env();
    if let Some(raw) = chains {
        let parsed = parse_chain_list(raw);
        if parsed.is_empty() {
            return Err(anyhow!("--chains '{raw}' names no usable chain ids"));
        }
        config.supported_chains = parsed;
    }
    Ok(config)
}

async fn run(cli: cli::Cli) -> Result<()> {
    let config = relay_config(cli.chains.as_deref())?;
    match cli.command {
        cli::Commands::Namespaces { proposal } => {
            let text = fs::read_to_string(&proposal)
                .with_context(|| format!("reading {}", proposal.display()))?;
            let proposal: SessionProposal =
                serde_json::from_str(&text).context("parsing session proposal")?;
            match build_approved_namespaces(&proposal, &cli.address, &config.supported_chains) {
                Ok(namespaces) => println!("{}", serde_json::to_string_pretty(&namespaces)?),
                Err(mismatch) => {
                    println!("{}", serde_json::to_string_pretty(&mismatch.reason())?);
                    return Err(anyhow!("proposal {} cannot be approved: {mismatch}", proposal.id));
                }
            }
        }
        cli::Commands::Replay {
            script,
            active_chain,
            metrics: print_metrics,
        } => {
            let text = fs::read_to_string(&script)
                .with_context(|| format!("reading {}", script.display()))?;
            let steps = replay::parse_script(&text)?;
            info!(steps = steps.len(), chains = ?config.supported_chains, "starting replay");

            let wallet = Participant {
                public_key: format!("dry-run:{}", cli.address),
                metadata: config.metadata.clone(),
            };
            let manager = InMemorySessionManager::new(wallet);
            let signer = Arc::new(DryRunSigner::new(cli.address.clone()));
            let (events_tx, events_rx) = event_channel(config.event_buffer);
            let controller =
                RelayController::new(config, manager.clone(), signer, ChainId(active_chain));
            let (handle, task) = controller.spawn(events_rx);

            let reports = replay::run_script(&handle, &events_tx, steps).await;
            handle.shutdown().await;
            task.await.context("relay controller task panicked")?;

            let mut stdout = std::io::stdout().lock();
            for report in reports? {
                writeln!(stdout, "{}", serde_json::to_string(&report)?)?;
            }
            for response in manager.responses().await {
                writeln!(
                    stdout,
                    "{}",
                    serde_json::to_string(&serde_json::json!({ "envelope": response }))?
                )?;
            }
            if print_metrics {
                stdout.write_all(&metrics::gather())?;
            }
        }
    }
    Ok(())
}
