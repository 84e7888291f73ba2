use async_trait::async_trait;
use bridge_proto::ChainId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transaction fields forwarded to the signer for `eth_sendTransaction`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFields {
    pub to: Option<String>,
    pub value: Option<u128>,
    pub data: Option<String>,
    pub gas: Option<u128>,
}

/// EIP-712 payload handed to the signer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataPayload {
    pub domain: serde_json::Value,
    pub types: serde_json::Value,
    pub primary_type: serde_json::Value,
    pub message: serde_json::Value,
}

/// Details of a contract call that reverted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractRevert {
    pub reason: Option<String>,
    pub error_name: Option<String>,
}

/// Failure reported by a signer. Signers may attach a short message, revert
/// details and an underlying cause; [`crate::classify`] picks the most useful
/// of those to show the user.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SignerError {
    pub message: String,
    pub short_message: Option<String>,
    pub revert: Option<ContractRevert>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl SignerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            short_message: None,
            revert: None,
            source: None,
        }
    }

    pub fn with_short_message(mut self, short: impl Into<String>) -> Self {
        self.short_message = Some(short.into());
        self
    }

    pub fn with_revert(mut self, revert: ContractRevert) -> Self {
        self.revert = Some(revert);
        self
    }

    pub fn caused_by(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(cause));
        self
    }
}

/// The connected signing account.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Address the account signs as; advertised in every approved namespace.
    fn address(&self) -> String;

    async fn send_transaction(&self, tx: TransactionFields) -> Result<String, SignerError>;

    /// Signs raw message bytes (personal_sign / eth_sign semantics).
    async fn sign_message(&self, raw: Vec<u8>) -> Result<String, SignerError>;

    async fn sign_typed_data(&self, payload: TypedDataPayload) -> Result<String, SignerError>;

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), SignerError>;
}
