//! Namespace negotiation for inbound session proposals.

use std::collections::BTreeMap;

use bridge_proto::{
    ChainId, ErrorReason, Namespace, Namespaces, ProposalNamespace, Session, SessionProposal,
    EIP155, UNSUPPORTED_CHAINS, UNSUPPORTED_EVENTS, UNSUPPORTED_METHODS,
    UNSUPPORTED_NAMESPACE_KEY,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::error::{RelayError, RelayResult};
use crate::metrics;
use crate::resolved::ResolvedIds;
use crate::session_manager::SessionManager;

/// Methods offered to every dApp.
pub const SUPPORTED_METHODS: [&str; 9] = [
    "eth_sendTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTransaction",
    "eth_signTypedData",
    "eth_signTypedData_v3",
    "eth_signTypedData_v4",
    "wallet_switchEthereumChain",
    "wallet_addEthereumChain",
];

pub const SUPPORTED_EVENTS: [&str; 2] = ["chainChanged", "accountsChanged"];

/// What a proposal required that we cannot offer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceMismatch {
    #[error("unsupported namespace {0}")]
    Namespace(String),
    #[error("unsupported chains {}", .0.join(", "))]
    Chains(Vec<String>),
    #[error("unsupported methods {}", .0.join(", "))]
    Methods(Vec<String>),
    #[error("unsupported events {}", .0.join(", "))]
    Events(Vec<String>),
}

impl NamespaceMismatch {
    /// Rejection reason sent back to the dApp.
    pub fn reason(&self) -> ErrorReason {
        let code = match self {
            NamespaceMismatch::Namespace(_) => UNSUPPORTED_NAMESPACE_KEY,
            NamespaceMismatch::Chains(_) => UNSUPPORTED_CHAINS,
            NamespaceMismatch::Methods(_) => UNSUPPORTED_METHODS,
            NamespaceMismatch::Events(_) => UNSUPPORTED_EVENTS,
        };
        let message = self.to_string();
        let mut chars = message.chars();
        let message = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => message,
        };
        ErrorReason::new(code, message)
    }
}

/// The full namespace this wallet can serve for `address` on `chains`.
pub fn supported_namespace(address: &str, chains: &[ChainId]) -> Namespace {
    let chains: Vec<String> = chains.iter().map(ChainId::caip2).collect();
    let accounts = chains
        .iter()
        .map(|chain| format!("{chain}:{address}"))
        .collect();
    Namespace {
        chains,
        accounts,
        methods: SUPPORTED_METHODS.iter().map(|m| m.to_string()).collect(),
        events: SUPPORTED_EVENTS.iter().map(|e| e.to_string()).collect(),
    }
}

/// Checks every required namespace of `proposal` against what we support and
/// returns the approved namespaces. The grant is always the full supported
/// `eip155` namespace; optional namespaces are not consulted and never cause
/// a mismatch.
pub fn build_approved_namespaces(
    proposal: &SessionProposal,
    address: &str,
    chains: &[ChainId],
) -> Result<Namespaces, NamespaceMismatch> {
    let supported = supported_namespace(address, chains);
    for (key, required) in &proposal.required_namespaces {
        check_required(key, required, &supported)?;
    }

    let mut approved = BTreeMap::new();
    approved.insert(EIP155.to_string(), supported);
    Ok(approved)
}

fn check_required(
    key: &str,
    required: &ProposalNamespace,
    supported: &Namespace,
) -> Result<(), NamespaceMismatch> {
    let mut requested_chains: Vec<String> = Vec::new();
    match key.split_once(':') {
        Some((namespace, _)) if namespace == EIP155 => requested_chains.push(key.to_string()),
        None if key == EIP155 => {}
        _ => return Err(NamespaceMismatch::Namespace(key.to_string())),
    }
    requested_chains.extend(required.chains.iter().flatten().cloned());

    let missing_chains = missing(&requested_chains, &supported.chains);
    if !missing_chains.is_empty() {
        return Err(NamespaceMismatch::Chains(missing_chains));
    }
    let missing_methods = missing(&required.methods, &supported.methods);
    if !missing_methods.is_empty() {
        return Err(NamespaceMismatch::Methods(missing_methods));
    }
    let missing_events = missing(&required.events, &supported.events);
    if !missing_events.is_empty() {
        return Err(NamespaceMismatch::Events(missing_events));
    }
    Ok(())
}

fn missing(requested: &[String], supported: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in requested {
        if !supported.contains(item) && !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Resolves session proposals, each exactly once.
#[derive(Debug, Default)]
pub struct ProposalHandler {
    resolved: ResolvedIds,
}

impl ProposalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self, id: u64) -> bool {
        self.resolved.contains(id)
    }

    fn ensure_open(&self, id: u64) -> RelayResult<()> {
        if self.is_resolved(id) {
            return Err(RelayError::AlreadyResolved {
                kind: "proposal",
                id,
            });
        }
        Ok(())
    }

    /// Approves `proposal` if every required namespace is servable. A proposal
    /// requiring something unsupported is rejected with the matching SDK code
    /// and reported as [`RelayError::NamespaceMismatch`].
    pub async fn approve(
        &mut self,
        manager: &dyn SessionManager,
        proposal: &SessionProposal,
        address: &str,
        chains: &[ChainId],
    ) -> RelayResult<Session> {
        self.ensure_open(proposal.id)?;

        let namespaces = match build_approved_namespaces(proposal, address, chains) {
            Ok(namespaces) => namespaces,
            Err(mismatch) => {
                warn!(proposal_id = proposal.id, %mismatch, "rejecting unservable proposal");
                match manager.reject_session(proposal.id, mismatch.reason()).await {
                    Ok(()) => {
                        self.resolved.insert(proposal.id);
                    }
                    Err(err) => {
                        warn!(proposal_id = proposal.id, error = %err, "failed to reject unservable proposal");
                    }
                }
                metrics::PROPOSALS.with_label_values(&["mismatch"]).inc();
                return Err(RelayError::NamespaceMismatch {
                    id: proposal.id,
                    mismatch,
                });
            }
        };

        debug!(proposal_id = proposal.id, ?namespaces, "approving session");
        let session = manager
            .approve_session(proposal.id, namespaces)
            .await
            .map_err(|err| {
                metrics::PROPOSALS.with_label_values(&["transport_error"]).inc();
                RelayError::TransportFailure {
                    message: classify(&err),
                }
            })?;
        self.resolved.insert(proposal.id);
        metrics::PROPOSALS.with_label_values(&["approved"]).inc();
        info!(
            proposal_id = proposal.id,
            topic = %session.topic,
            peer = %proposal.proposer.metadata.name,
            "session approved"
        );
        Ok(session)
    }

    pub async fn reject(
        &mut self,
        manager: &dyn SessionManager,
        proposal: &SessionProposal,
    ) -> RelayResult<()> {
        self.ensure_open(proposal.id)?;
        manager
            .reject_session(proposal.id, ErrorReason::user_rejected_session())
            .await
            .map_err(|err| {
                metrics::PROPOSALS.with_label_values(&["transport_error"]).inc();
                RelayError::TransportFailure {
                    message: classify(&err),
                }
            })?;
        self.resolved.insert(proposal.id);
        metrics::PROPOSALS.with_label_values(&["rejected"]).inc();
        info!(proposal_id = proposal.id, "session proposal rejected");
        Ok(())
    }
}
