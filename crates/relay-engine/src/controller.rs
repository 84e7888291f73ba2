//! The relay controller owns all relay state and is the only consumer of
//! session manager events. Callers talk to a running controller through a
//! cloneable [`RelayHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_proto::{ChainId, ErrorReason, Session, SessionProposal};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chain_switch::ChainSwitchCoordinator;
use crate::classify::classify;
use crate::config::RelayConfig;
use crate::dispatcher::{
    CurrentRequest, DispatchState, PendingFlag, RelayNotice, RequestDispatcher, RequestOutcome,
};
use crate::error::{RelayError, RelayResult};
use crate::notifier::broadcast_chain_changed;
use crate::preview::{preview, RequestPreview};
use crate::proposal::ProposalHandler;
use crate::registry::ActiveSessionRegistry;
use crate::session_manager::{SessionEvent, SessionManager};
use crate::signer::Signer;

const PAIRING_URI_PREFIX: &str = "wc:";

/// What closing the request surface did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    Rejected,
    /// A handler is still running; it will finish on its own.
    StillProcessing,
    NothingOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
    pub id: u64,
    pub topic: String,
    pub method: String,
    pub chain_id: String,
    pub state: DispatchState,
    pub preview: RequestPreview,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelaySnapshot {
    pub address: String,
    pub active_chain: ChainId,
    pub current_proposal: Option<u64>,
    pub current_request: Option<RequestSummary>,
    pub pending: bool,
    pub switch_target: Option<ChainId>,
    pub requires_switch: bool,
    pub sessions: Vec<String>,
}

#[derive(Debug, Default)]
struct RelayState {
    current_proposal: Option<SessionProposal>,
    current_request: Option<CurrentRequest>,
}

pub struct RelayController {
    config: RelayConfig,
    manager: Arc<dyn SessionManager>,
    signer: Arc<dyn Signer>,
    proposals: ProposalHandler,
    dispatcher: RequestDispatcher,
    coordinator: ChainSwitchCoordinator,
    registry: ActiveSessionRegistry,
    state: RelayState,
    busy: ActionGate,
}

impl RelayController {
    pub fn new(
        config: RelayConfig,
        manager: Arc<dyn SessionManager>,
        signer: Arc<dyn Signer>,
        active_chain: ChainId,
    ) -> Self {
        Self {
            config,
            manager,
            signer,
            proposals: ProposalHandler::new(),
            dispatcher: RequestDispatcher::new(),
            coordinator: ChainSwitchCoordinator::new(active_chain),
            registry: ActiveSessionRegistry::new(),
            state: RelayState::default(),
            busy: ActionGate::default(),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &ActiveSessionRegistry {
        &self.registry
    }

    pub fn current_proposal(&self) -> Option<&SessionProposal> {
        self.state.current_proposal.as_ref()
    }

    pub fn current_request(&self) -> Option<&CurrentRequest> {
        self.state.current_request.as_ref()
    }

    pub fn active_chain(&self) -> ChainId {
        self.coordinator.active_chain()
    }

    pub async fn load_sessions(&mut self) -> RelayResult<usize> {
        self.registry.refresh(self.manager.as_ref()).await
    }

    async fn refresh_registry(&mut self) {
        if let Err(err) = self.registry.refresh(self.manager.as_ref()).await {
            warn!(error = %err, "failed to refresh active sessions");
        }
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Proposal(proposal) => {
                if let Some(previous) = &self.state.current_proposal {
                    warn!(
                        dropped = previous.id,
                        proposal_id = proposal.id,
                        "new session proposal replaces an unresolved one"
                    );
                }
                info!(
                    proposal_id = proposal.id,
                    peer = %proposal.proposer.metadata.name,
                    "session proposal received"
                );
                self.state.current_proposal = Some(proposal);
            }
            SessionEvent::Request(request) => {
                if let Some(previous) = &self.state.current_request {
                    warn!(
                        dropped = previous.request.id,
                        request_id = request.id,
                        "new session request replaces an unresolved one"
                    );
                }
                let requested = ChainId::parse_caip2(&request.chain_id).ok();
                let needs_switch = self.coordinator.evaluate(requested, &request.method);
                info!(
                    request_id = request.id,
                    topic = %request.topic,
                    method = %request.method,
                    chain_id = %request.chain_id,
                    needs_switch,
                    "session request received"
                );
                self.state.current_request = Some(CurrentRequest::new(request, needs_switch));
            }
            SessionEvent::Deleted { topic } => {
                info!(%topic, "session deleted");
                self.refresh_registry().await;
            }
        }
    }

    fn open_proposal(&self, id: u64) -> RelayResult<SessionProposal> {
        if self.proposals.is_resolved(id) {
            return Err(RelayError::AlreadyResolved {
                kind: "proposal",
                id,
            });
        }
        match &self.state.current_proposal {
            Some(proposal) if proposal.id == id => Ok(proposal.clone()),
            _ => Err(RelayError::NoCurrentProposal(id)),
        }
    }

    fn clear_resolved_proposal(&mut self, id: u64) {
        if self.proposals.is_resolved(id)
            && self.state.current_proposal.as_ref().map(|p| p.id) == Some(id)
        {
            self.state.current_proposal = None;
        }
    }

    pub async fn approve_proposal(&mut self, id: u64) -> RelayResult<Session> {
        let proposal = self.open_proposal(id)?;
        let address = self.signer.address();
        let result = self
            .proposals
            .approve(
                self.manager.as_ref(),
                &proposal,
                &address,
                &self.config.supported_chains,
            )
            .await;
        self.clear_resolved_proposal(id);
        let session = result?;
        self.refresh_registry().await;
        Ok(session)
    }

    pub async fn reject_proposal(&mut self, id: u64) -> RelayResult<()> {
        let proposal = self.open_proposal(id)?;
        let result = self
            .proposals
            .reject(self.manager.as_ref(), &proposal)
            .await;
        self.clear_resolved_proposal(id);
        result
    }

    fn check_request(&self, id: u64) -> RelayResult<()> {
        if self.dispatcher.is_resolved(id) {
            return Err(RelayError::AlreadyResolved {
                kind: "request",
                id,
            });
        }
        match &self.state.current_request {
            Some(current) if current.request.id == id => Ok(()),
            _ => Err(RelayError::NoCurrentRequest(id)),
        }
    }

    pub async fn approve_request(&mut self, id: u64) -> RelayResult<RequestOutcome> {
        self.check_request(id)?;
        let Some(current) = self.state.current_request.as_mut() else {
            return Err(RelayError::NoCurrentRequest(id));
        };
        let result = self
            .dispatcher
            .approve(
                current,
                self.manager.as_ref(),
                self.signer.as_ref(),
                &mut self.coordinator,
            )
            .await;
        self.after_dispatch(&result);
        if let Ok(RequestOutcome::Approved { notices, .. }) = &result {
            for notice in notices {
                if let RelayNotice::ChainSwitched { chain_id } = notice {
                    self.announce_chain(*chain_id).await;
                }
            }
        }
        result
    }

    pub async fn reject_request(&mut self, id: u64) -> RelayResult<RequestOutcome> {
        self.check_request(id)?;
        let Some(current) = self.state.current_request.as_mut() else {
            return Err(RelayError::NoCurrentRequest(id));
        };
        let result = self
            .dispatcher
            .reject(current, self.manager.as_ref(), &mut self.coordinator)
            .await;
        self.after_dispatch(&result);
        result
    }

    /// Drops a resolved request, or re-derives the switch requirement for one
    /// that is still open after a failure.
    fn after_dispatch(&mut self, result: &RelayResult<RequestOutcome>) {
        let Some(current) = self.state.current_request.as_mut() else {
            return;
        };
        if current.state == DispatchState::Resolved {
            self.state.current_request = None;
            return;
        }
        if result.is_err() {
            let requested = ChainId::parse_caip2(&current.request.chain_id).ok();
            if self.coordinator.evaluate(requested, &current.request.method) {
                current.state = DispatchState::AwaitingChainSwitch;
            }
        }
    }

    /// Rejects the current request unless a handler is still running on it.
    pub async fn close_request(&mut self) -> RelayResult<CloseOutcome> {
        if self.dispatcher.is_pending() {
            return Ok(CloseOutcome::StillProcessing);
        }
        let Some(id) = self.state.current_request.as_ref().map(|c| c.request.id) else {
            return Ok(CloseOutcome::NothingOpen);
        };
        match self.reject_request(id).await? {
            RequestOutcome::Ignored => Ok(CloseOutcome::StillProcessing),
            _ => Ok(CloseOutcome::Rejected),
        }
    }

    /// Performs the chain switch the current request is waiting for.
    pub async fn switch_chain(&mut self) -> RelayResult<ChainId> {
        let target = self
            .coordinator
            .switch_target()
            .filter(|_| self.coordinator.requires_switch())
            .ok_or(RelayError::NoSwitchTarget)?;
        self.coordinator
            .execute(self.signer.as_ref(), target)
            .await?;
        if let Some(current) = self.state.current_request.as_mut() {
            if current.state == DispatchState::AwaitingChainSwitch {
                current.state = DispatchState::Idle;
            }
        }
        self.announce_chain(target).await;
        Ok(target)
    }

    /// The wallet moved to `chain` on its own.
    pub async fn chain_changed(&mut self, chain: ChainId) -> Vec<String> {
        if !self.coordinator.set_active_chain(chain) {
            return Vec::new();
        }
        info!(chain_id = %chain, "active chain changed");
        if let Some(current) = self.state.current_request.as_mut() {
            let requested = ChainId::parse_caip2(&current.request.chain_id).ok();
            let needs_switch = self.coordinator.evaluate(requested, &current.request.method);
            if matches!(
                current.state,
                DispatchState::Idle | DispatchState::AwaitingChainSwitch
            ) {
                current.state = if needs_switch {
                    DispatchState::AwaitingChainSwitch
                } else {
                    DispatchState::Idle
                };
            }
        }
        self.announce_chain(chain).await
    }

    async fn announce_chain(&self, chain: ChainId) -> Vec<String> {
        let notified =
            broadcast_chain_changed(self.manager.as_ref(), self.registry.sessions(), chain).await;
        debug!(chain_id = %chain, sessions = notified.len(), "announced chain change");
        notified
    }

    pub async fn pair(&mut self, uri: &str) -> RelayResult<()> {
        if !uri.starts_with(PAIRING_URI_PREFIX) {
            return Err(RelayError::InvalidPairingUri(uri.to_string()));
        }
        self.manager
            .pair(uri)
            .await
            .map_err(|err| RelayError::TransportFailure {
                message: classify(&err),
            })?;
        info!("pairing started");
        Ok(())
    }

    pub async fn disconnect(&mut self, topic: &str) -> RelayResult<()> {
        self.manager
            .disconnect_session(topic, ErrorReason::user_disconnected())
            .await
            .map_err(|err| RelayError::TransportFailure {
                message: classify(&err),
            })?;
        info!(%topic, "session disconnected");
        self.refresh_registry().await;
        Ok(())
    }

    pub fn snapshot(&self) -> RelaySnapshot {
        let address = self.signer.address();
        let current_request = self.state.current_request.as_ref().map(|current| {
            let request = &current.request;
            RequestSummary {
                id: request.id,
                topic: request.topic.clone(),
                method: request.method.clone(),
                chain_id: request.chain_id.clone(),
                state: current.state,
                preview: preview(request, &address),
            }
        });
        RelaySnapshot {
            active_chain: self.coordinator.active_chain(),
            current_proposal: self.state.current_proposal.as_ref().map(|p| p.id),
            current_request,
            pending: self.dispatcher.is_pending(),
            switch_target: self.coordinator.switch_target(),
            requires_switch: self.coordinator.requires_switch(),
            sessions: self.registry.topics(),
            address,
        }
    }

    /// Moves the controller onto its own task. Events are always drained
    /// before caller commands so a command never overtakes the event it
    /// refers to.
    pub fn spawn(
        self,
        events: mpsc::Receiver<SessionEvent>,
    ) -> (RelayHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let handle = RelayHandle {
            commands: commands_tx,
            pending: self.dispatcher.pending_flag(),
            busy: self.busy.clone(),
        };
        let task = tokio::spawn(self.run(events, commands_rx));
        (handle, task)
    }

    async fn run(
        mut self,
        mut events: mpsc::Receiver<SessionEvent>,
        mut commands: mpsc::Receiver<RelayCommand>,
    ) {
        match self.load_sessions().await {
            Ok(count) => info!(sessions = count, "relay controller started"),
            Err(err) => warn!(error = %err, "initial session load failed"),
        }
        let mut events_open = true;
        loop {
            tokio::select! {
                biased;
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        debug!("session event stream closed");
                        events_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(RelayCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
            }
        }
        info!("relay controller stopped");
    }

    async fn handle_command(&mut self, command: RelayCommand) {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            RelayCommand::ApproveProposal { id, reply } => {
                let _ = reply.send(self.approve_proposal(id).await);
            }
            RelayCommand::RejectProposal { id, reply } => {
                let _ = reply.send(self.reject_proposal(id).await);
            }
            // Claimed commands release the gate before replying so the caller
            // can act again as soon as it sees the outcome.
            RelayCommand::ApproveRequest { id, reply } => {
                let outcome = self.approve_request(id).await;
                self.busy.release();
                let _ = reply.send(outcome);
            }
            RelayCommand::RejectRequest { id, reply } => {
                let outcome = self.reject_request(id).await;
                self.busy.release();
                let _ = reply.send(outcome);
            }
            RelayCommand::CloseRequest { reply } => {
                let outcome = self.close_request().await;
                match reply {
                    Some(reply) => {
                        self.busy.release();
                        let _ = reply.send(outcome);
                    }
                    None => {
                        if let Err(err) = outcome {
                            warn!(error = %err, "deferred close failed");
                        }
                    }
                }
            }
            RelayCommand::SwitchChain { reply } => {
                let _ = reply.send(self.switch_chain().await);
            }
            RelayCommand::ChainChanged { chain, reply } => {
                let _ = reply.send(self.chain_changed(chain).await);
            }
            RelayCommand::Pair { uri, reply } => {
                let _ = reply.send(self.pair(&uri).await);
            }
            RelayCommand::Disconnect { topic, reply } => {
                let _ = reply.send(self.disconnect(&topic).await);
            }
            RelayCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            RelayCommand::Shutdown => {}
        }
    }
}

/// Held by a [`RelayHandle`] from the moment it sends an approve, reject or
/// close until the controller has handled it. Only one such action is ever
/// queued or running.
#[derive(Debug, Clone, Default)]
struct ActionGate(Arc<AtomicBool>);

impl ActionGate {
    fn claim(&self) -> Option<ActionClaim> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ActionClaim(Some(self.clone())))
    }

    fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Releases the gate on drop unless the command reached the controller,
/// which then owns the release.
struct ActionClaim(Option<ActionGate>);

impl ActionClaim {
    fn hand_off(mut self) {
        self.0 = None;
    }
}

impl Drop for ActionClaim {
    fn drop(&mut self) {
        if let Some(gate) = self.0.take() {
            gate.release();
        }
    }
}

enum RelayCommand {
    ApproveProposal {
        id: u64,
        reply: oneshot::Sender<RelayResult<Session>>,
    },
    RejectProposal {
        id: u64,
        reply: oneshot::Sender<RelayResult<()>>,
    },
    ApproveRequest {
        id: u64,
        reply: oneshot::Sender<RelayResult<RequestOutcome>>,
    },
    RejectRequest {
        id: u64,
        reply: oneshot::Sender<RelayResult<RequestOutcome>>,
    },
    /// `None` when the caller already returned without waiting; only the
    /// `Some` form holds the action gate.
    CloseRequest {
        reply: Option<oneshot::Sender<RelayResult<CloseOutcome>>>,
    },
    SwitchChain {
        reply: oneshot::Sender<RelayResult<ChainId>>,
    },
    ChainChanged {
        chain: ChainId,
        reply: oneshot::Sender<Vec<String>>,
    },
    Pair {
        uri: String,
        reply: oneshot::Sender<RelayResult<()>>,
    },
    Disconnect {
        topic: String,
        reply: oneshot::Sender<RelayResult<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<RelaySnapshot>,
    },
    Shutdown,
}

/// Cloneable front door to a spawned [`RelayController`].
#[derive(Clone)]
pub struct RelayHandle {
    commands: mpsc::Sender<RelayCommand>,
    pending: PendingFlag,
    busy: ActionGate,
}

impl RelayHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RelayCommand,
    ) -> RelayResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| RelayError::ControllerClosed)?;
        rx.await.map_err(|_| RelayError::ControllerClosed)
    }

    /// Like `call`, for actions on the current request. Returns `None`
    /// without sending anything while another such action is queued or
    /// running.
    async fn call_exclusive<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RelayCommand,
    ) -> Option<RelayResult<T>> {
        let claim = self.busy.claim()?;
        let (tx, rx) = oneshot::channel();
        if self.commands.send(build(tx)).await.is_err() {
            return Some(Err(RelayError::ControllerClosed));
        }
        claim.hand_off();
        Some(rx.await.map_err(|_| RelayError::ControllerClosed))
    }

    /// True while an approve, reject or close is queued or running.
    pub fn is_pending(&self) -> bool {
        self.busy.is_claimed() || self.pending.get()
    }

    pub async fn approve_proposal(&self, id: u64) -> RelayResult<Session> {
        self.call(|reply| RelayCommand::ApproveProposal { id, reply })
            .await?
    }

    pub async fn reject_proposal(&self, id: u64) -> RelayResult<()> {
        self.call(|reply| RelayCommand::RejectProposal { id, reply })
            .await?
    }

    /// [`RequestOutcome::Ignored`] while another action on the request is in
    /// flight; nothing is queued behind it.
    pub async fn approve_request(&self, id: u64) -> RelayResult<RequestOutcome> {
        match self
            .call_exclusive(|reply| RelayCommand::ApproveRequest { id, reply })
            .await
        {
            Some(outcome) => outcome?,
            None => {
                debug!(request_id = id, "approve ignored while pending");
                Ok(RequestOutcome::Ignored)
            }
        }
    }

    pub async fn reject_request(&self, id: u64) -> RelayResult<RequestOutcome> {
        match self
            .call_exclusive(|reply| RelayCommand::RejectRequest { id, reply })
            .await
        {
            Some(outcome) => outcome?,
            None => {
                debug!(request_id = id, "reject ignored while pending");
                Ok(RequestOutcome::Ignored)
            }
        }
    }

    /// Returns immediately with [`CloseOutcome::StillProcessing`] while a
    /// handler is in flight; the close is then queued and becomes a no-op if
    /// the request resolves first.
    pub async fn close_request(&self) -> RelayResult<CloseOutcome> {
        if let Some(outcome) = self
            .call_exclusive(|reply| RelayCommand::CloseRequest { reply: Some(reply) })
            .await
        {
            return outcome?;
        }
        self.commands
            .send(RelayCommand::CloseRequest { reply: None })
            .await
            .map_err(|_| RelayError::ControllerClosed)?;
        Ok(CloseOutcome::StillProcessing)
    }

    pub async fn switch_chain(&self) -> RelayResult<ChainId> {
        self.call(|reply| RelayCommand::SwitchChain { reply }).await?
    }

    pub async fn chain_changed(&self, chain: ChainId) -> RelayResult<Vec<String>> {
        self.call(|reply| RelayCommand::ChainChanged { chain, reply })
            .await
    }

    pub async fn pair(&self, uri: impl Into<String>) -> RelayResult<()> {
        let uri = uri.into();
        self.call(|reply| RelayCommand::Pair { uri, reply }).await?
    }

    pub async fn disconnect(&self, topic: impl Into<String>) -> RelayResult<()> {
        let topic = topic.into();
        self.call(|reply| RelayCommand::Disconnect { topic, reply })
            .await?
    }

    pub async fn snapshot(&self) -> RelayResult<RelaySnapshot> {
        self.call(|reply| RelayCommand::Snapshot { reply }).await
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(RelayCommand::Shutdown).await;
    }
}
