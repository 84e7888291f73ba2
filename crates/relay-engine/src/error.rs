use bridge_proto::ChainId;
use thiserror::Error;

use crate::proposal::NamespaceMismatch;

/// JSON-RPC "invalid params".
const INVALID_PARAMS: i64 = -32602;

pub type RelayResult<T> = Result<T, RelayError>;

/// Failures surfaced by the public relay operations. Every collaborator error
/// is converted into one of these at the operation boundary, with a message
/// already reduced to something a user can read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("proposal {id} cannot be served: {mismatch}")]
    NamespaceMismatch {
        id: u64,
        mismatch: NamespaceMismatch,
    },
    #[error("{kind} {id} was already resolved")]
    AlreadyResolved { kind: &'static str, id: u64 },
    #[error("signer failed: {message}")]
    SignerFailure { message: String },
    #[error("{message}")]
    ChainSwitchFailure { chain_id: ChainId, message: String },
    #[error("session transport failed: {message}")]
    TransportFailure { message: String },
    #[error("invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },
    #[error("no session proposal {0} is awaiting resolution")]
    NoCurrentProposal(u64),
    #[error("no session request {0} is awaiting a response")]
    NoCurrentRequest(u64),
    #[error("no chain switch is waiting to be performed")]
    NoSwitchTarget,
    #[error("invalid pairing uri '{0}'")]
    InvalidPairingUri(String),
    #[error("relay controller has shut down")]
    ControllerClosed,
}

impl RelayError {
    pub(crate) fn invalid_params(method: &str, reason: impl Into<String>) -> Self {
        RelayError::InvalidParams {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    /// Machine-readable code for callers that report failures over JSON-RPC.
    pub fn code(&self) -> Option<i64> {
        match self {
            RelayError::NamespaceMismatch { mismatch, .. } => Some(mismatch.reason().code),
            RelayError::InvalidParams { .. } => Some(INVALID_PARAMS),
            _ => None,
        }
    }

    /// Whether the interaction that produced this error is still open and may
    /// be retried or closed by the caller.
    pub fn leaves_request_open(&self) -> bool {
        matches!(
            self,
            RelayError::SignerFailure { .. }
                | RelayError::ChainSwitchFailure { .. }
                | RelayError::TransportFailure { .. }
                | RelayError::InvalidParams { .. }
        )
    }
}
