use serde::{Deserialize, Serialize};

use crate::namespace::{Namespaces, ProposalNamespaces};

/// Descriptive metadata a wallet or dApp advertises during pairing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub public_key: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// An established session as reported by the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub topic: String,
    #[serde(default)]
    pub namespaces: Namespaces,
    /// Our side of the session.
    #[serde(rename = "self")]
    pub local: Participant,
    pub peer: Participant,
    /// Public key of the participant controlling the session.
    pub controller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProposal {
    pub id: u64,
    #[serde(default)]
    pub required_namespaces: ProposalNamespaces,
    #[serde(default)]
    pub optional_namespaces: ProposalNamespaces,
    #[serde(default)]
    pub proposer: Participant,
}

/// A method call a connected dApp sent over an established session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub id: u64,
    pub topic: String,
    /// CAIP-2 chain the dApp expects the call to run against.
    pub chain_id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl SessionRequest {
    /// Positional parameter `index`, if the dApp sent a params array.
    pub fn param(&self, index: usize) -> Option<&serde_json::Value> {
        self.params.as_array().and_then(|params| params.get(index))
    }
}

/// Event pushed from the wallet to a session (`chainChanged`, `accountsChanged`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEventPayload {
    pub name: String,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_uses_wire_field_names() {
        let session: Session = serde_json::from_value(json!({
            "topic": "abc",
            "namespaces": {},
            "self": {"publicKey": "wallet", "metadata": {"name": "Bridge"}},
            "peer": {"publicKey": "dapp", "metadata": {"name": "Uniswap"}},
            "controller": "dapp"
        }))
        .unwrap();
        assert_eq!(session.local.public_key, "wallet");
        assert_eq!(session.peer.metadata.name, "Uniswap");
        assert_eq!(session.controller, "dapp");
        assert!(session.expiry.is_none());
    }

    #[test]
    fn request_params_are_positional() {
        let request: SessionRequest = serde_json::from_value(json!({
            "id": 1,
            "topic": "abc",
            "chainId": "eip155:1",
            "method": "personal_sign",
            "params": ["0x68656c6c6f", "0xabc"]
        }))
        .unwrap();
        assert_eq!(request.param(0), Some(&json!("0x68656c6c6f")));
        assert_eq!(request.param(2), None);
    }

    #[test]
    fn missing_params_default_to_null() {
        let request: SessionRequest = serde_json::from_value(json!({
            "id": 1,
            "topic": "abc",
            "chainId": "eip155:1",
            "method": "eth_chainId"
        }))
        .unwrap();
        assert!(request.params.is_null());
        assert_eq!(request.param(0), None);
    }
}
