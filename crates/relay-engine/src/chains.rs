use bridge_proto::ChainId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainInfo {
    pub id: ChainId,
    pub name: &'static str,
}

/// Chains the bridge serves out of the box, in the order they are advertised.
pub const DEFAULT_CHAINS: &[ChainInfo] = &[
    ChainInfo {
        id: ChainId(1),
        name: "Ethereum",
    },
    ChainInfo {
        id: ChainId(42161),
        name: "Arbitrum One",
    },
    ChainInfo {
        id: ChainId(10),
        name: "OP Mainnet",
    },
    ChainInfo {
        id: ChainId(8453),
        name: "Base",
    },
];

pub fn default_chain_ids() -> Vec<ChainId> {
    DEFAULT_CHAINS.iter().map(|chain| chain.id).collect()
}

pub fn chain_name(id: ChainId) -> Option<&'static str> {
    DEFAULT_CHAINS
        .iter()
        .find(|chain| chain.id == id)
        .map(|chain| chain.name)
}

/// Human-readable label: the chain name when known, the raw id otherwise.
pub fn describe_chain(id: ChainId) -> String {
    match chain_name(id) {
        Some(name) => name.to_string(),
        None => format!("Chain ID: {id}"),
    }
}
