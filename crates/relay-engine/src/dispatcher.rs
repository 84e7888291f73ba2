//! Routing and single-flight handling of the current session request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_proto::{
    encode_error, encode_success, parse_quantity, ChainId, ErrorReason, JsonRpcResponse,
    SessionRequest,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::chain_switch::ChainSwitchCoordinator;
use crate::classify::classify;
use crate::error::{RelayError, RelayResult};
use crate::metrics;
use crate::resolved::ResolvedIds;
use crate::session_manager::SessionManager;
use crate::signer::{Signer, TransactionFields, TypedDataPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    SendTransaction,
    SignMessage,
    SignTypedData,
    SwitchChain,
    AddChain,
    Acknowledge,
}

const ROUTES: &[(&str, Route)] = &[
    ("eth_sendTransaction", Route::SendTransaction),
    ("personal_sign", Route::SignMessage),
    ("eth_sign", Route::SignMessage),
    ("eth_signTypedData", Route::SignTypedData),
    ("eth_signTypedData_v3", Route::SignTypedData),
    ("eth_signTypedData_v4", Route::SignTypedData),
    ("wallet_switchEthereumChain", Route::SwitchChain),
    ("wallet_addEthereumChain", Route::AddChain),
];

impl Route {
    /// Exact method-name lookup; anything unknown is acknowledged.
    pub fn resolve(method: &str) -> Self {
        ROUTES
            .iter()
            .find(|(name, _)| *name == method)
            .map(|(_, route)| *route)
            .unwrap_or(Route::Acknowledge)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Route::SendTransaction => "send_transaction",
            Route::SignMessage => "sign_message",
            Route::SignTypedData => "sign_typed_data",
            Route::SwitchChain => "switch_chain",
            Route::AddChain => "add_chain",
            Route::Acknowledge => "acknowledge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Idle,
    AwaitingChainSwitch,
    Processing,
    Resolved,
}

/// The single request the relay is currently working on.
#[derive(Debug, Clone)]
pub struct CurrentRequest {
    pub request: SessionRequest,
    pub state: DispatchState,
}

impl CurrentRequest {
    pub fn new(request: SessionRequest, needs_switch: bool) -> Self {
        let state = if needs_switch {
            DispatchState::AwaitingChainSwitch
        } else {
            DispatchState::Idle
        };
        Self { request, state }
    }
}

/// Side effects a handler wants surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayNotice {
    /// The dApp asked to add a chain; nothing was added.
    AddChainRequested {
        chain_id: Option<String>,
        chain_name: Option<String>,
    },
    ChainSwitched { chain_id: ChainId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    Approved {
        response: JsonRpcResponse,
        notices: Vec<RelayNotice>,
    },
    Rejected { response: JsonRpcResponse },
    /// Another action on this request is still in flight.
    Ignored,
}

/// Shared view of the single-flight flag, readable without going through the
/// controller.
#[derive(Debug, Clone, Default)]
pub struct PendingFlag(Arc<AtomicBool>);

impl PendingFlag {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, value: bool) {
        self.0.store(value, Ordering::Release);
    }
}

struct Handled {
    result: Value,
    notices: Vec<RelayNotice>,
}

impl Handled {
    fn result(result: Value) -> Self {
        Self {
            result,
            notices: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RequestDispatcher {
    pending: PendingFlag,
    resolved: ResolvedIds,
}

impl RequestDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_flag(&self) -> PendingFlag {
        self.pending.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    pub fn is_resolved(&self, id: u64) -> bool {
        self.resolved.contains(id)
    }

    fn ensure_open(&self, current: &CurrentRequest) -> RelayResult<()> {
        if current.state == DispatchState::Resolved || self.is_resolved(current.request.id) {
            return Err(RelayError::AlreadyResolved {
                kind: "request",
                id: current.request.id,
            });
        }
        Ok(())
    }

    fn settle(&self, coordinator: &mut ChainSwitchCoordinator) {
        self.pending.set(false);
        coordinator.clear();
    }

    /// Runs the routed handler, then submits the success envelope. Failures
    /// leave the request open in `Idle` so the caller can retry or close it.
    pub async fn approve(
        &mut self,
        current: &mut CurrentRequest,
        manager: &dyn SessionManager,
        signer: &dyn Signer,
        coordinator: &mut ChainSwitchCoordinator,
    ) -> RelayResult<RequestOutcome> {
        if self.is_pending() {
            debug!(request_id = current.request.id, "approve ignored while pending");
            return Ok(RequestOutcome::Ignored);
        }
        self.ensure_open(current)?;

        let request = &current.request;
        let route = Route::resolve(&request.method);
        current.state = DispatchState::Processing;
        self.pending.set(true);
        info!(
            request_id = request.id,
            topic = %request.topic,
            method = %request.method,
            route = route.label(),
            "processing session request"
        );

        let handled = match execute(route, request, signer, coordinator).await {
            Ok(handled) => handled,
            Err(err) => {
                self.settle(coordinator);
                current.state = DispatchState::Idle;
                metrics::REQUESTS
                    .with_label_values(&[route.label(), "error"])
                    .inc();
                warn!(request_id = request.id, method = %request.method, error = %err, "session request failed");
                return Err(err);
            }
        };

        let response = encode_success(request.id, handled.result);
        if let Err(err) = manager
            .respond_session_request(&request.topic, response.clone())
            .await
        {
            self.settle(coordinator);
            current.state = DispatchState::Idle;
            metrics::REQUESTS
                .with_label_values(&[route.label(), "transport_error"])
                .inc();
            let mut message = classify(&err);
            if route == Route::SendTransaction {
                let hash = response.result().and_then(Value::as_str).unwrap_or_default();
                warn!(
                    request_id = request.id,
                    %hash,
                    error = %err,
                    "transaction already broadcast but the dApp was not told; approving again sends it again"
                );
                message = format!("{message} (transaction {hash} was already broadcast)");
            } else {
                warn!(request_id = request.id, error = %err, "failed to submit response");
            }
            return Err(RelayError::TransportFailure { message });
        }

        self.settle(coordinator);
        current.state = DispatchState::Resolved;
        self.resolved.insert(request.id);
        metrics::REQUESTS
            .with_label_values(&[route.label(), "approved"])
            .inc();
        Ok(RequestOutcome::Approved {
            response,
            notices: handled.notices,
        })
    }

    /// Responds with the standard user-rejection error. Never touches the
    /// signer.
    pub async fn reject(
        &mut self,
        current: &mut CurrentRequest,
        manager: &dyn SessionManager,
        coordinator: &mut ChainSwitchCoordinator,
    ) -> RelayResult<RequestOutcome> {
        if self.is_pending() {
            debug!(request_id = current.request.id, "reject ignored while pending");
            return Ok(RequestOutcome::Ignored);
        }
        self.ensure_open(current)?;

        let request = &current.request;
        let route = Route::resolve(&request.method);
        let reason = ErrorReason::user_rejected_request();
        let response = encode_error(request.id, reason.code, reason.message);
        self.pending.set(true);
        let submitted = manager
            .respond_session_request(&request.topic, response.clone())
            .await;
        self.settle(coordinator);
        if let Err(err) = submitted {
            current.state = DispatchState::Idle;
            metrics::REQUESTS
                .with_label_values(&[route.label(), "transport_error"])
                .inc();
            return Err(RelayError::TransportFailure {
                message: classify(&err),
            });
        }

        current.state = DispatchState::Resolved;
        self.resolved.insert(request.id);
        metrics::REQUESTS
            .with_label_values(&[route.label(), "rejected"])
            .inc();
        info!(request_id = request.id, method = %request.method, "session request rejected");
        Ok(RequestOutcome::Rejected { response })
    }
}

async fn execute(
    route: Route,
    request: &SessionRequest,
    signer: &dyn Signer,
    coordinator: &mut ChainSwitchCoordinator,
) -> RelayResult<Handled> {
    let method = request.method.as_str();
    match route {
        Route::SendTransaction => {
            let tx = transaction_fields(request)?;
            let hash = signer
                .send_transaction(tx)
                .await
                .map_err(|err| signer_failure(&err))?;
            Ok(Handled::result(Value::String(hash)))
        }
        Route::SignMessage => {
            let message = request
                .param(0)
                .and_then(Value::as_str)
                .ok_or_else(|| RelayError::invalid_params(method, "params[0] must be a message"))?;
            let signature = signer
                .sign_message(message_bytes(message))
                .await
                .map_err(|err| signer_failure(&err))?;
            Ok(Handled::result(Value::String(signature)))
        }
        Route::SignTypedData => {
            let raw = request
                .param(1)
                .ok_or_else(|| RelayError::invalid_params(method, "params[1] must hold typed data"))?;
            let payload = typed_data_payload(&decode_typed_data(raw));
            let signature = signer
                .sign_typed_data(payload)
                .await
                .map_err(|err| signer_failure(&err))?;
            Ok(Handled::result(Value::String(signature)))
        }
        Route::SwitchChain => {
            let chain_id = request
                .param(0)
                .and_then(|p| p.get("chainId"))
                .and_then(Value::as_str)
                .ok_or_else(|| RelayError::invalid_params(method, "params[0].chainId is missing"))?;
            let target = ChainId::parse_hex(chain_id)
                .map_err(|err| RelayError::invalid_params(method, err.to_string()))?;
            coordinator.execute(signer, target).await?;
            Ok(Handled {
                result: Value::Null,
                notices: vec![RelayNotice::ChainSwitched { chain_id: target }],
            })
        }
        Route::AddChain => {
            let params = request.param(0);
            let field = |name: &str| {
                params
                    .and_then(|p| p.get(name))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            let notice = RelayNotice::AddChainRequested {
                chain_id: field("chainId"),
                chain_name: field("chainName"),
            };
            info!(request_id = request.id, ?notice, "dApp requested a chain to be added");
            Ok(Handled {
                result: Value::Null,
                notices: vec![notice],
            })
        }
        Route::Acknowledge => {
            debug!(request_id = request.id, method, "acknowledging unrouted method");
            Ok(Handled::result(Value::String("0x".into())))
        }
    }
}

fn signer_failure(err: &crate::signer::SignerError) -> RelayError {
    RelayError::SignerFailure {
        message: classify(err),
    }
}

fn transaction_fields(request: &SessionRequest) -> RelayResult<TransactionFields> {
    let method = request.method.as_str();
    let params = request
        .param(0)
        .filter(|p| p.is_object())
        .ok_or_else(|| RelayError::invalid_params(method, "params[0] must be a transaction"))?;
    let text = |name: &str| params.get(name).and_then(Value::as_str).map(str::to_string);
    let quantity = |name: &str| -> RelayResult<Option<u128>> {
        match params.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => parse_quantity(value)
                .map(Some)
                .map_err(|err| RelayError::invalid_params(method, err.to_string())),
        }
    };
    Ok(TransactionFields {
        to: text("to"),
        value: quantity("value")?,
        data: text("data"),
        gas: quantity("gas")?,
    })
}

/// Raw bytes of a personal_sign / eth_sign message. Hex payloads are decoded;
/// anything else is signed as its UTF-8 bytes.
fn message_bytes(message: &str) -> Vec<u8> {
    message
        .strip_prefix("0x")
        .and_then(|hex| hex::decode(hex).ok())
        .unwrap_or_else(|| message.as_bytes().to_vec())
}

/// Typed data may arrive JSON-encoded inside a string; fall back to the
/// literal value when it does not parse.
pub(crate) fn decode_typed_data(raw: &Value) -> Value {
    match raw {
        Value::String(text) => serde_json::from_str(text).unwrap_or_else(|err| {
            debug!(error = %err, "typed data is not JSON; using literal value");
            raw.clone()
        }),
        other => other.clone(),
    }
}

fn typed_data_payload(data: &Value) -> TypedDataPayload {
    let field = |name: &str| data.get(name).cloned().unwrap_or(Value::Null);
    TypedDataPayload {
        domain: field("domain"),
        types: field("types"),
        primary_type: field("primaryType"),
        message: field("message"),
    }
}
