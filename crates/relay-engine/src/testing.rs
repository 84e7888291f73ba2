use std::sync::Mutex;

use async_trait::async_trait;
use bridge_proto::ChainId;

use crate::signer::{ContractRevert, Signer, SignerError, TransactionFields, TypedDataPayload};

pub const SIGNER_ADDRESS: &str = "0x2222222222222222222222222222222222222222";

#[derive(Debug, Clone, PartialEq)]
pub enum SignerCall {
    SendTransaction(TransactionFields),
    SignMessage(Vec<u8>),
    SignTypedData(TypedDataPayload),
    SwitchChain(ChainId),
}

#[derive(Default)]
struct Failures {
    signing: Option<(String, Option<String>)>,
    switching: Option<String>,
}

/// Signer double that records every call and fails on demand.
#[derive(Default)]
pub struct RecordingSigner {
    calls: Mutex<Vec<SignerCall>>,
    failures: Mutex<Failures>,
}

impl RecordingSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signing calls fail with `message`, optionally as a contract revert.
    pub fn fail_signing(&self, message: &str, revert_reason: Option<&str>) {
        self.failures.lock().unwrap().signing =
            Some((message.to_string(), revert_reason.map(str::to_string)));
    }

    pub fn fail_switch(&self, message: &str) {
        self.failures.lock().unwrap().switching = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<SignerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn switches(&self) -> Vec<ChainId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SignerCall::SwitchChain(chain) => Some(chain),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SignerCall) -> Result<(), SignerError> {
        let is_switch = matches!(call, SignerCall::SwitchChain(_));
        self.calls.lock().unwrap().push(call);
        let failures = self.failures.lock().unwrap();
        if is_switch {
            if let Some(message) = &failures.switching {
                return Err(SignerError::new(message.clone()));
            }
        } else if let Some((message, revert)) = &failures.signing {
            let mut err = SignerError::new(message.clone());
            if let Some(reason) = revert {
                err = err.with_revert(ContractRevert {
                    reason: Some(reason.clone()),
                    error_name: None,
                });
            }
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl Signer for RecordingSigner {
    fn address(&self) -> String {
        SIGNER_ADDRESS.to_string()
    }

    async fn send_transaction(&self, tx: TransactionFields) -> Result<String, SignerError> {
        self.record(SignerCall::SendTransaction(tx))?;
        Ok("0xhash".into())
    }

    async fn sign_message(&self, raw: Vec<u8>) -> Result<String, SignerError> {
        self.record(SignerCall::SignMessage(raw))?;
        Ok("0xsignature".into())
    }

    async fn sign_typed_data(&self, payload: TypedDataPayload) -> Result<String, SignerError> {
        self.record(SignerCall::SignTypedData(payload))?;
        Ok("0xtypedsignature".into())
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), SignerError> {
        self.record(SignerCall::SwitchChain(chain_id))
    }
}
