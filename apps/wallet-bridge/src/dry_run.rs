use async_trait::async_trait;
use bridge_proto::ChainId;
use relay_engine::{Signer, SignerError, TransactionFields, TypedDataPayload};
use sha2::{Digest, Sha256};
use tracing::info;

/// Signer that never touches a key. Every result is a SHA-256 digest of the
/// input, so replays are reproducible.
pub struct DryRunSigner {
    address: String,
}

impl DryRunSigner {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    fn digest(&self, kind: &str, payload: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update(self.address.as_bytes());
        hasher.update(payload);
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, SignerError> {
    serde_json::to_vec(value)
        .map_err(|err| SignerError::new("could not encode signing payload").caused_by(err))
}

#[async_trait]
impl Signer for DryRunSigner {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn send_transaction(&self, tx: TransactionFields) -> Result<String, SignerError> {
        let hash = self.digest("tx", &encode(&tx)?);
        info!(to = ?tx.to, value = ?tx.value, %hash, "dry-run transaction");
        Ok(hash)
    }

    async fn sign_message(&self, raw: Vec<u8>) -> Result<String, SignerError> {
        Ok(self.digest("message", &raw))
    }

    async fn sign_typed_data(&self, payload: TypedDataPayload) -> Result<String, SignerError> {
        Ok(self.digest("typed", &encode(&payload)?))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), SignerError> {
        info!(chain_id = %chain_id, "dry-run chain switch");
        Ok(())
    }
}
