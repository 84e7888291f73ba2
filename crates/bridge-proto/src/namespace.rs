use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Approved namespaces keyed by CAIP namespace (`eip155`).
pub type Namespaces = BTreeMap<String, Namespace>;

/// Requested namespaces keyed either by namespace (`eip155`) or by a single
/// chain (`eip155:10`).
pub type ProposalNamespaces = BTreeMap<String, ProposalNamespace>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalNamespace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<Vec<String>>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

impl Namespace {
    pub fn has_chain(&self, caip2: &str) -> bool {
        self.chains.iter().any(|chain| chain == caip2)
            || self
                .accounts
                .iter()
                .any(|account| account.starts_with(caip2) && account[caip2.len()..].starts_with(':'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn proposal_namespace_chains_are_optional() {
        let parsed: ProposalNamespaces = serde_json::from_value(json!({
            "eip155": {"chains": ["eip155:1"], "methods": ["personal_sign"], "events": []},
            "eip155:10": {"methods": ["eth_sendTransaction"], "events": ["chainChanged"]}
        }))
        .unwrap();
        assert_eq!(
            parsed["eip155"].chains.as_deref(),
            Some(&["eip155:1".to_string()][..])
        );
        assert!(parsed["eip155:10"].chains.is_none());
    }

    #[test]
    fn has_chain_checks_chains_and_accounts() {
        let ns = Namespace {
            chains: vec!["eip155:1".into()],
            accounts: vec!["eip155:8453:0xabc".into()],
            ..Default::default()
        };
        assert!(ns.has_chain("eip155:1"));
        assert!(ns.has_chain("eip155:8453"));
        assert!(!ns.has_chain("eip155:84"));
        assert!(!ns.has_chain("eip155:10"));
    }
}
