use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_proto::{
    ErrorReason, JsonRpcResponse, Namespaces, Participant, Session, SessionEventPayload,
    SessionProposal, SessionRequest,
};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Inbound events from the session manager. Consumed by exactly one
/// [`crate::RelayController`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Proposal(SessionProposal),
    Request(SessionRequest),
    /// The peer or the relay tore a session down.
    Deleted { topic: String },
}

pub fn event_channel(
    depth: usize,
) -> (mpsc::Sender<SessionEvent>, mpsc::Receiver<SessionEvent>) {
    mpsc::channel(depth)
}

#[derive(Debug, Error)]
pub enum SessionManagerError {
    #[error("session transport error: {0}")]
    Transport(String),
    #[error("unknown session topic {0}")]
    UnknownTopic(String),
}

/// Pairing and session lifecycle owned by the relay transport.
#[async_trait]
pub trait SessionManager: Send + Sync {
    async fn active_sessions(&self) -> Result<BTreeMap<String, Session>, SessionManagerError>;

    async fn approve_session(
        &self,
        id: u64,
        namespaces: Namespaces,
    ) -> Result<Session, SessionManagerError>;

    async fn reject_session(&self, id: u64, reason: ErrorReason)
        -> Result<(), SessionManagerError>;

    async fn respond_session_request(
        &self,
        topic: &str,
        response: JsonRpcResponse,
    ) -> Result<(), SessionManagerError>;

    async fn disconnect_session(
        &self,
        topic: &str,
        reason: ErrorReason,
    ) -> Result<(), SessionManagerError>;

    /// Starts pairing with the dApp behind a connection URI.
    async fn pair(&self, uri: &str) -> Result<(), SessionManagerError>;

    async fn emit_session_event(
        &self,
        topic: &str,
        chain_id: &str,
        event: SessionEventPayload,
    ) -> Result<(), SessionManagerError>;
}

/// Calls the in-memory manager has seen, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerCall {
    Approve { id: u64, namespaces: Namespaces },
    Reject { id: u64, reason: ErrorReason },
    Respond { topic: String, response: JsonRpcResponse },
    Disconnect { topic: String, reason: ErrorReason },
    Pair { uri: String },
    Emit {
        topic: String,
        chain_id: String,
        event: SessionEventPayload,
    },
}

/// In-memory adapter for tests and dry runs. Approved sessions are created
/// with the dApp as controller; loopback sessions can be seeded directly.
pub struct InMemorySessionManager {
    local: Participant,
    sessions: Mutex<BTreeMap<String, Session>>,
    calls: Mutex<Vec<ManagerCall>>,
    failure: Mutex<Option<String>>,
}

impl InMemorySessionManager {
    pub fn new(local: Participant) -> Arc<Self> {
        Arc::new(Self {
            local,
            sessions: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        })
    }

    pub async fn seed_session(&self, session: Session) {
        self.sessions
            .lock()
            .await
            .insert(session.topic.clone(), session);
    }

    /// Makes every following call fail with a transport error until cleared.
    pub async fn fail_with(&self, message: Option<&str>) {
        *self.failure.lock().await = message.map(str::to_string);
    }

    pub async fn calls(&self) -> Vec<ManagerCall> {
        self.calls.lock().await.clone()
    }

    pub async fn responses(&self) -> Vec<JsonRpcResponse> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                ManagerCall::Respond { response, .. } => Some(response.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: ManagerCall) -> Result<(), SessionManagerError> {
        if let Some(message) = self.failure.lock().await.clone() {
            return Err(SessionManagerError::Transport(message));
        }
        self.calls.lock().await.push(call);
        Ok(())
    }
}

#[async_trait]
impl SessionManager for InMemorySessionManager {
    async fn active_sessions(&self) -> Result<BTreeMap<String, Session>, SessionManagerError> {
        Ok(self.sessions.lock().await.clone())
    }

    async fn approve_session(
        &self,
        id: u64,
        namespaces: Namespaces,
    ) -> Result<Session, SessionManagerError> {
        self.record(ManagerCall::Approve {
            id,
            namespaces: namespaces.clone(),
        })
        .await?;
        let peer = Participant {
            public_key: format!("peer-{id}"),
            metadata: Default::default(),
        };
        let session = Session {
            topic: format!("topic-{id}"),
            namespaces,
            local: self.local.clone(),
            controller: peer.public_key.clone(),
            peer,
            expiry: None,
        };
        self.seed_session(session.clone()).await;
        Ok(session)
    }

    async fn reject_session(
        &self,
        id: u64,
        reason: ErrorReason,
    ) -> Result<(), SessionManagerError> {
        self.record(ManagerCall::Reject { id, reason }).await
    }

    async fn respond_session_request(
        &self,
        topic: &str,
        response: JsonRpcResponse,
    ) -> Result<(), SessionManagerError> {
        self.record(ManagerCall::Respond {
            topic: topic.to_string(),
            response,
        })
        .await
    }

    async fn disconnect_session(
        &self,
        topic: &str,
        reason: ErrorReason,
    ) -> Result<(), SessionManagerError> {
        if !self.sessions.lock().await.contains_key(topic) {
            return Err(SessionManagerError::UnknownTopic(topic.to_string()));
        }
        self.record(ManagerCall::Disconnect {
            topic: topic.to_string(),
            reason,
        })
        .await?;
        self.sessions.lock().await.remove(topic);
        Ok(())
    }

    async fn pair(&self, uri: &str) -> Result<(), SessionManagerError> {
        self.record(ManagerCall::Pair {
            uri: uri.to_string(),
        })
        .await
    }

    async fn emit_session_event(
        &self,
        topic: &str,
        chain_id: &str,
        event: SessionEventPayload,
    ) -> Result<(), SessionManagerError> {
        self.record(ManagerCall::Emit {
            topic: topic.to_string(),
            chain_id: chain_id.to_string(),
            event,
        })
        .await
    }
}
