use std::env;

use bridge_proto::{ChainId, Metadata};

use crate::chains::default_chain_ids;

const DEFAULT_EVENT_BUFFER: usize = 64;
const DEFAULT_PROJECT_ID: &str = "YOUR_PROJECT_ID";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Relay project id handed to the session manager at init.
    pub project_id: String,
    /// Metadata advertised to dApps during pairing.
    pub metadata: Metadata,
    /// Chains offered in every approved namespace, in order.
    pub supported_chains: Vec<ChainId>,
    /// Depth of the inbound event and command channels.
    pub event_buffer: usize,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        let project_id = env::var("WALLET_BRIDGE_PROJECT_ID")
            .or_else(|_| env::var("WALLETCONNECT_PROJECT_ID"))
            .unwrap_or_else(|_| DEFAULT_PROJECT_ID.into());
        let supported_chains = env::var("WALLET_BRIDGE_CHAINS")
            .ok()
            .map(|raw| parse_chain_list(&raw))
            .filter(|chains| !chains.is_empty())
            .unwrap_or_else(default_chain_ids);
        let event_buffer = env::var("WALLET_BRIDGE_EVENT_BUFFER")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|depth: &usize| *depth > 0)
            .unwrap_or(DEFAULT_EVENT_BUFFER);
        let defaults = default_metadata();
        let metadata = Metadata {
            name: env::var("WALLET_BRIDGE_NAME").unwrap_or(defaults.name),
            description: env::var("WALLET_BRIDGE_DESCRIPTION").unwrap_or(defaults.description),
            url: env::var("WALLET_BRIDGE_URL").unwrap_or(defaults.url),
            icons: env::var("WALLET_BRIDGE_ICON")
                .map(|icon| vec![icon])
                .unwrap_or(defaults.icons),
        };
        Self {
            project_id,
            metadata,
            supported_chains,
            event_buffer,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.into(),
            metadata: default_metadata(),
            supported_chains: default_chain_ids(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

fn default_metadata() -> Metadata {
    Metadata {
        name: "Smart Wallet Bridge".into(),
        description: "Bridge your smart wallet using WalletConnect".into(),
        url: "http://localhost:3000".into(),
        icons: Vec::new(),
    }
}

/// Parses `1,42161, 10` into chain ids, skipping blanks and duplicates.
/// Entries may also be written in CAIP-2 form.
pub fn parse_chain_list(raw: &str) -> Vec<ChainId> {
    let mut chains: Vec<ChainId> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parsed = ChainId::parse_caip2(entry)
            .ok()
            .or_else(|| entry.parse().ok().map(ChainId));
        match parsed {
            Some(chain) if !chains.contains(&chain) => chains.push(chain),
            Some(_) => {}
            None => tracing::warn!(entry, "ignoring unparsable chain id"),
        }
    }
    chains
}
