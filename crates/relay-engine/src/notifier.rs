use bridge_proto::{ChainId, Session, SessionEventPayload, EIP155};
use serde_json::Value;
use tracing::{debug, warn};

use crate::session_manager::SessionManager;

pub const CHAIN_CHANGED: &str = "chainChanged";

/// Tells every session that was granted `chain` that it is now active.
/// Sessions without that chain in their namespace are skipped. Returns the
/// topics that were notified; failures are logged and do not stop the sweep.
pub async fn broadcast_chain_changed<'a>(
    manager: &dyn SessionManager,
    sessions: impl IntoIterator<Item = &'a Session>,
    chain: ChainId,
) -> Vec<String> {
    let caip2 = chain.caip2();
    let mut notified = Vec::new();
    for session in sessions {
        let granted = session
            .namespaces
            .get(EIP155)
            .is_some_and(|ns| ns.has_chain(&caip2));
        if !granted {
            debug!(topic = %session.topic, chain_id = %caip2, "session not granted chain; skipping");
            continue;
        }
        let event = SessionEventPayload {
            name: CHAIN_CHANGED.to_string(),
            data: Value::String(caip2.clone()),
        };
        match manager
            .emit_session_event(&session.topic, &caip2, event)
            .await
        {
            Ok(()) => notified.push(session.topic.clone()),
            Err(err) => {
                warn!(topic = %session.topic, chain_id = %caip2, error = %err, "failed to emit chainChanged");
            }
        }
    }
    notified
}
