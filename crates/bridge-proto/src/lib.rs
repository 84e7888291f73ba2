//! Wire definitions shared between the relay engine and whatever session
//! transport sits in front of it: sessions, proposals, requests, CAIP
//! namespaces and the JSON-RPC envelopes returned to dApps.
//! Keeping these in a dedicated crate lets the transport adapters depend on
//! the shapes without pulling in the engine runtime.

pub mod chain;
pub mod envelope;
pub mod namespace;
pub mod session;

pub use chain::{parse_quantity, ChainId, ProtoError, EIP155};
pub use envelope::{
    encode_error, encode_success, ErrorReason, JsonRpcResponse, JSONRPC_VERSION,
    UNSUPPORTED_CHAINS, UNSUPPORTED_EVENTS, UNSUPPORTED_METHODS, UNSUPPORTED_NAMESPACE_KEY,
    USER_DISCONNECTED, USER_REJECTED,
};
pub use namespace::{Namespace, Namespaces, ProposalNamespace, ProposalNamespaces};
pub use session::{
    Metadata, Participant, Session, SessionEventPayload, SessionProposal, SessionRequest,
};
