//! Drives a spawned relay controller end to end through its handle, with the
//! in-memory session manager standing in for the relay transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_proto::{
    ChainId, Participant, ProposalNamespace, SessionProposal, SessionRequest, USER_REJECTED,
};
use relay_engine::{
    event_channel, CloseOutcome, InMemorySessionManager, ManagerCall, RelayConfig,
    RelayController, RelayError, RequestOutcome, SessionEvent, Signer, SignerError,
    TransactionFields, TypedDataPayload,
};
use serde_json::json;
use tokio::sync::Notify;

const ADDRESS: &str = "0x3333333333333333333333333333333333333333";

/// Signer whose transactions block until the test releases them.
struct GatedSigner {
    gate: Notify,
    sends: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl GatedSigner {
    fn new() -> Self {
        Self {
            gate: Notify::new(),
            sends: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    /// The first released transaction fails with `message`.
    fn failing_once(message: &str) -> Self {
        let signer = Self::new();
        *signer.failure.lock().unwrap() = Some(message.to_string());
        signer
    }

    fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for GatedSigner {
    fn address(&self) -> String {
        ADDRESS.into()
    }

    async fn send_transaction(&self, _tx: TransactionFields) -> Result<String, SignerError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        let failure = self.failure.lock().unwrap().take();
        match failure {
            Some(message) => Err(SignerError::new(message)),
            None => Ok("0xfeed".into()),
        }
    }

    async fn sign_message(&self, _raw: Vec<u8>) -> Result<String, SignerError> {
        Ok("0xsig".into())
    }

    async fn sign_typed_data(&self, _payload: TypedDataPayload) -> Result<String, SignerError> {
        Ok("0xsig".into())
    }

    async fn switch_chain(&self, _chain_id: ChainId) -> Result<(), SignerError> {
        Ok(())
    }
}

fn wallet() -> Participant {
    Participant {
        public_key: "wallet-key".into(),
        metadata: Default::default(),
    }
}

fn proposal(id: u64) -> SessionProposal {
    let mut required = std::collections::BTreeMap::new();
    required.insert(
        "eip155".to_string(),
        ProposalNamespace {
            chains: Some(vec!["eip155:1".into()]),
            methods: vec!["eth_sendTransaction".into(), "personal_sign".into()],
            events: vec!["chainChanged".into()],
        },
    );
    SessionProposal {
        id,
        required_namespaces: required,
        optional_namespaces: Default::default(),
        proposer: Participant::default(),
    }
}

fn request(id: u64, topic: &str, method: &str, params: serde_json::Value) -> SessionRequest {
    SessionRequest {
        id,
        topic: topic.into(),
        chain_id: "eip155:1".into(),
        method: method.into(),
        params,
    }
}

async fn wait_for_pending(handle: &relay_engine::RelayHandle) {
    for _ in 0..200 {
        if handle.is_pending() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("request never became pending");
}

#[tokio::test]
async fn proposal_then_requests_round_trip() {
    let manager = InMemorySessionManager::new(wallet());
    let signer = Arc::new(GatedSigner::new());
    let controller = RelayController::new(
        RelayConfig::default(),
        manager.clone(),
        signer.clone(),
        ChainId(1),
    );
    let (events_tx, events_rx) = event_channel(16);
    let (handle, task) = controller.spawn(events_rx);

    events_tx
        .send(SessionEvent::Proposal(proposal(1)))
        .await
        .unwrap();
    let session = handle.approve_proposal(1).await.unwrap();
    assert_eq!(session.topic, "topic-1");
    assert_eq!(
        handle.snapshot().await.unwrap().sessions,
        vec!["topic-1".to_string()]
    );

    events_tx
        .send(SessionEvent::Request(request(
            2,
            "topic-1",
            "personal_sign",
            json!(["0x6869", ADDRESS]),
        )))
        .await
        .unwrap();
    let outcome = handle.approve_request(2).await.unwrap();
    let RequestOutcome::Approved { response, .. } = outcome else {
        panic!("expected approval");
    };
    assert_eq!(
        serde_json::to_value(response).unwrap(),
        json!({"id": 2, "jsonrpc": "2.0", "result": "0xsig"})
    );

    events_tx
        .send(SessionEvent::Request(request(3, "topic-1", "eth_chainId", json!([]))))
        .await
        .unwrap();
    assert!(matches!(
        handle.reject_request(3).await.unwrap(),
        RequestOutcome::Rejected { response } if response.error().map(|e| e.code) == Some(USER_REJECTED)
    ));
    assert_eq!(
        handle.approve_request(3).await,
        Err(RelayError::AlreadyResolved {
            kind: "request",
            id: 3
        })
    );

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn closing_while_in_flight_does_not_cancel() {
    let manager = InMemorySessionManager::new(wallet());
    let signer = Arc::new(GatedSigner::new());
    let controller = RelayController::new(
        RelayConfig::default(),
        manager.clone(),
        signer.clone(),
        ChainId(1),
    );
    let (events_tx, events_rx) = event_channel(16);
    let (handle, task) = controller.spawn(events_rx);

    events_tx
        .send(SessionEvent::Request(request(
            7,
            "topic-9",
            "eth_sendTransaction",
            json!([{"to": "0xabc", "value": "0x0"}]),
        )))
        .await
        .unwrap();

    let approving = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.approve_request(7).await })
    };
    wait_for_pending(&handle).await;

    assert_eq!(
        handle.close_request().await.unwrap(),
        CloseOutcome::StillProcessing
    );

    signer.gate.notify_one();
    let outcome = approving.await.unwrap().unwrap();
    assert!(matches!(outcome, RequestOutcome::Approved { .. }));

    // The queued close ran after the approval and found nothing to close.
    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot.current_request.is_none());
    assert!(!snapshot.pending);
    let responses = manager.responses().await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].result(), Some(&json!("0xfeed")));

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn actions_while_in_flight_are_ignored_not_queued() {
    let manager = InMemorySessionManager::new(wallet());
    let signer = Arc::new(GatedSigner::failing_once("nonce too low"));
    let controller = RelayController::new(
        RelayConfig::default(),
        manager.clone(),
        signer.clone(),
        ChainId(1),
    );
    let (events_tx, events_rx) = event_channel(16);
    let (handle, task) = controller.spawn(events_rx);

    events_tx
        .send(SessionEvent::Request(request(
            7,
            "topic-9",
            "eth_sendTransaction",
            json!([{"to": "0xabc", "value": "0x1"}]),
        )))
        .await
        .unwrap();

    let approving = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.approve_request(7).await })
    };
    wait_for_pending(&handle).await;

    assert_eq!(handle.approve_request(7).await, Ok(RequestOutcome::Ignored));
    assert_eq!(handle.reject_request(7).await, Ok(RequestOutcome::Ignored));

    signer.gate.notify_one();
    assert_eq!(
        approving.await.unwrap(),
        Err(RelayError::SignerFailure {
            message: "nonce too low".into()
        })
    );
    assert_eq!(signer.sends(), 1);
    assert!(manager.responses().await.is_empty());
    assert!(!handle.is_pending());

    // Retrying once the first attempt has settled is an explicit new send.
    signer.gate.notify_one();
    let retried = handle.approve_request(7).await.unwrap();
    assert!(matches!(retried, RequestOutcome::Approved { .. }));
    assert_eq!(signer.sends(), 2);
    assert_eq!(manager.responses().await.len(), 1);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn disconnect_and_pairing_go_through_the_manager() {
    let manager = InMemorySessionManager::new(wallet());
    let signer = Arc::new(GatedSigner::new());
    let controller = RelayController::new(
        RelayConfig::default(),
        manager.clone(),
        signer,
        ChainId(1),
    );
    let (events_tx, events_rx) = event_channel(4);
    let (handle, task) = controller.spawn(events_rx);

    events_tx
        .send(SessionEvent::Proposal(proposal(4)))
        .await
        .unwrap();
    handle.approve_proposal(4).await.unwrap();
    handle.pair("wc:deadbeef@2?symKey=00").await.unwrap();
    handle.disconnect("topic-4").await.unwrap();
    assert!(handle.snapshot().await.unwrap().sessions.is_empty());

    let calls = manager.calls().await;
    assert!(matches!(calls[0], ManagerCall::Approve { id: 4, .. }));
    assert!(matches!(&calls[1], ManagerCall::Pair { uri } if uri.starts_with("wc:")));
    assert!(matches!(&calls[2], ManagerCall::Disconnect { reason, .. } if reason.code == 6000));

    drop(events_tx);
    handle.shutdown().await;
    task.await.unwrap();
    assert!(matches!(
        handle.snapshot().await,
        Err(RelayError::ControllerClosed)
    ));
}
