use bridge_proto::ChainId;
use tracing::{info, warn};

use crate::chains::describe_chain;
use crate::classify::classify;
use crate::error::{RelayError, RelayResult};
use crate::metrics;
use crate::signer::Signer;

/// Signing methods whose result depends on the active chain matching the
/// chain the dApp asked for.
pub const CHAIN_VALIDATING_METHODS: [&str; 7] = [
    "eth_sendTransaction",
    "eth_signTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTypedData",
    "eth_signTypedData_v3",
    "eth_signTypedData_v4",
];

pub fn requires_switch(active: ChainId, requested: ChainId, method: &str) -> bool {
    active != requested && CHAIN_VALIDATING_METHODS.contains(&method)
}

/// Tracks the active chain and any switch the current request needs.
#[derive(Debug, Clone)]
pub struct ChainSwitchCoordinator {
    active: ChainId,
    target: Option<ChainId>,
    required: bool,
    in_flight: bool,
}

impl ChainSwitchCoordinator {
    pub fn new(active: ChainId) -> Self {
        Self {
            active,
            target: None,
            required: false,
            in_flight: false,
        }
    }

    pub fn active_chain(&self) -> ChainId {
        self.active
    }

    /// Records a chain change that happened outside the relay. Returns true
    /// when the active chain actually moved.
    pub fn set_active_chain(&mut self, chain: ChainId) -> bool {
        let changed = self.active != chain;
        self.active = chain;
        changed
    }

    /// Re-evaluates the switch requirement for a request against `requested`.
    /// Requests on a chain we cannot parse never require a switch.
    pub fn evaluate(&mut self, requested: Option<ChainId>, method: &str) -> bool {
        match requested {
            Some(requested) if requires_switch(self.active, requested, method) => {
                self.target = Some(requested);
                self.required = true;
            }
            _ => {
                self.target = None;
                self.required = false;
            }
        }
        self.required
    }

    pub fn requires_switch(&self) -> bool {
        self.required
    }

    pub fn switch_target(&self) -> Option<ChainId> {
        self.target
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn clear(&mut self) {
        self.target = None;
        self.required = false;
        self.in_flight = false;
    }

    /// Asks the signer to move to `target`. On success the target is kept so
    /// the caller can still refer to (or undo) the switch.
    pub async fn execute(&mut self, signer: &dyn Signer, target: ChainId) -> RelayResult<()> {
        self.in_flight = true;
        let result = signer.switch_chain(target).await;
        self.in_flight = false;
        match result {
            Ok(()) => {
                self.required = false;
                self.active = target;
                metrics::CHAIN_SWITCHES.with_label_values(&["ok"]).inc();
                info!(chain_id = %target, "switched chain");
                Ok(())
            }
            Err(err) => {
                metrics::CHAIN_SWITCHES.with_label_values(&["error"]).inc();
                warn!(chain_id = %target, cause = %classify(&err), "chain switch failed");
                Err(RelayError::ChainSwitchFailure {
                    chain_id: target,
                    message: format!("Failed to switch to {}", describe_chain(target)),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSigner;

    #[test]
    fn switch_truth_table() {
        assert!(!requires_switch(ChainId(1), ChainId(1), "eth_sendTransaction"));
        assert!(requires_switch(ChainId(1), ChainId(137), "eth_sendTransaction"));
        assert!(!requires_switch(ChainId(1), ChainId(137), "wallet_addEthereumChain"));
        assert!(!requires_switch(ChainId(1), ChainId(137), "wallet_switchEthereumChain"));
        assert!(requires_switch(ChainId(10), ChainId(8453), "eth_signTypedData_v4"));
    }

    #[test]
    fn evaluate_sets_and_clears_target() {
        let mut coordinator = ChainSwitchCoordinator::new(ChainId(1));
        assert!(coordinator.evaluate(Some(ChainId(8453)), "personal_sign"));
        assert_eq!(coordinator.switch_target(), Some(ChainId(8453)));

        assert!(!coordinator.evaluate(Some(ChainId(1)), "personal_sign"));
        assert_eq!(coordinator.switch_target(), None);

        assert!(!coordinator.evaluate(None, "personal_sign"));
        assert!(!coordinator.requires_switch());
    }

    #[tokio::test]
    async fn successful_switch_keeps_target() {
        let signer = RecordingSigner::new();
        let mut coordinator = ChainSwitchCoordinator::new(ChainId(1));
        coordinator.evaluate(Some(ChainId(10)), "eth_sendTransaction");

        coordinator.execute(&signer, ChainId(10)).await.unwrap();
        assert!(!coordinator.requires_switch());
        assert!(!coordinator.in_flight());
        assert_eq!(coordinator.switch_target(), Some(ChainId(10)));
        assert_eq!(coordinator.active_chain(), ChainId(10));
        assert_eq!(signer.switches(), vec![ChainId(10)]);
    }

    #[tokio::test]
    async fn failed_switch_names_the_chain() {
        let signer = RecordingSigner::new();
        signer.fail_switch("user rejected switch");
        let mut coordinator = ChainSwitchCoordinator::new(ChainId(1));
        coordinator.evaluate(Some(ChainId(8453)), "personal_sign");

        let err = coordinator.execute(&signer, ChainId(8453)).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to switch to Base");
        assert!(coordinator.requires_switch());
        assert!(!coordinator.in_flight());
        assert_eq!(coordinator.active_chain(), ChainId(1));
    }

    #[tokio::test]
    async fn unknown_chains_are_named_by_id() {
        let signer = RecordingSigner::new();
        signer.fail_switch("unsupported");
        let mut coordinator = ChainSwitchCoordinator::new(ChainId(1));
        let err = coordinator.execute(&signer, ChainId(137)).await.unwrap_err();
        assert_eq!(
            err,
            RelayError::ChainSwitchFailure {
                chain_id: ChainId(137),
                message: "Failed to switch to Chain ID: 137".into(),
            }
        );
    }
}
