//! Relay engine: sits between one signing account and the dApps paired with
//! it, deciding what each inbound session proposal and session request turns
//! into.
//!
//! Responsibilities:
//! - negotiating the approved namespace for a session proposal
//! - routing the current session request to the signer by method name
//! - coordinating chain switches before chain-validating methods run
//! - encoding JSON-RPC responses and turning failures into readable causes
//! - tracking the dApp sessions that are currently active

pub mod chain_switch;
pub mod chains;
pub mod classify;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod preview;
pub mod proposal;
pub mod registry;
mod resolved;
pub mod session_manager;
pub mod signer;

#[cfg(test)]
pub(crate) mod testing;

pub use chain_switch::{requires_switch, ChainSwitchCoordinator, CHAIN_VALIDATING_METHODS};
pub use classify::classify;
pub use config::RelayConfig;
pub use controller::{CloseOutcome, RelayController, RelayHandle, RelaySnapshot, RequestSummary};
pub use dispatcher::{
    CurrentRequest, DispatchState, PendingFlag, RelayNotice, RequestDispatcher, RequestOutcome,
    Route,
};
pub use error::{RelayError, RelayResult};
pub use notifier::broadcast_chain_changed;
pub use preview::{preview, MessageEncoding, RequestPreview};
pub use proposal::{
    build_approved_namespaces, NamespaceMismatch, ProposalHandler, SUPPORTED_EVENTS,
    SUPPORTED_METHODS,
};
pub use registry::{filter_active, is_loopback, ActiveSessionRegistry};
pub use resolved::RESOLVED_HISTORY;
pub use session_manager::{
    event_channel, InMemorySessionManager, ManagerCall, SessionEvent, SessionManager,
    SessionManagerError,
};
pub use signer::{ContractRevert, Signer, SignerError, TransactionFields, TypedDataPayload};
