use anyhow::{Context, Result};
use bridge_proto::{ChainId, SessionProposal, SessionRequest};
use relay_engine::{RelayError, RelayHandle, RelayResult, SessionEvent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

/// One line of a replay script. Session manager events and user actions are
/// interleaved in the order they should happen.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    Proposal(SessionProposal),
    Request(SessionRequest),
    Deleted { topic: String },
    ApproveProposal { id: u64 },
    RejectProposal { id: u64 },
    ApproveRequest { id: u64 },
    RejectRequest { id: u64 },
    CloseRequest,
    SwitchChain,
    ChainChanged { chain_id: u64 },
    Pair { uri: String },
    Disconnect { topic: String },
    Snapshot,
}

impl ScriptStep {
    fn name(&self) -> &'static str {
        match self {
            ScriptStep::Proposal(_) => "proposal",
            ScriptStep::Request(_) => "request",
            ScriptStep::Deleted { .. } => "deleted",
            ScriptStep::ApproveProposal { .. } => "approve_proposal",
            ScriptStep::RejectProposal { .. } => "reject_proposal",
            ScriptStep::ApproveRequest { .. } => "approve_request",
            ScriptStep::RejectRequest { .. } => "reject_request",
            ScriptStep::CloseRequest => "close_request",
            ScriptStep::SwitchChain => "switch_chain",
            ScriptStep::ChainChanged { .. } => "chain_changed",
            ScriptStep::Pair { .. } => "pair",
            ScriptStep::Disconnect { .. } => "disconnect",
            ScriptStep::Snapshot => "snapshot",
        }
    }
}

/// Parses a JSON-lines script, skipping blank lines and `#` comments.
pub fn parse_script(text: &str) -> Result<Vec<(usize, ScriptStep)>> {
    text.lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid script step on line {line_no}"))
                .map(|step| (line_no, step))
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct StepReport {
    pub line: usize,
    pub step: &'static str,
    #[serde(flatten)]
    pub outcome: Value,
}

fn report<T: Serialize>(result: RelayResult<T>) -> Result<Value> {
    Ok(match result {
        Ok(value) => json!({ "ok": serde_json::to_value(value)? }),
        Err(err) => json!({ "error": err.to_string(), "code": err.code() }),
    })
}

/// Runs every step against a spawned controller and returns one report per
/// step. Relay errors are reported, not fatal; a closed controller is.
pub async fn run_script(
    handle: &RelayHandle,
    events: &mpsc::Sender<SessionEvent>,
    steps: Vec<(usize, ScriptStep)>,
) -> Result<Vec<StepReport>> {
    let mut reports = Vec::with_capacity(steps.len());
    for (line, step) in steps {
        let name = step.name();
        debug!(line, step = name, "replaying step");
        let event = match &step {
            ScriptStep::Proposal(proposal) => Some(SessionEvent::Proposal(proposal.clone())),
            ScriptStep::Request(request) => Some(SessionEvent::Request(request.clone())),
            ScriptStep::Deleted { topic } => Some(SessionEvent::Deleted {
                topic: topic.clone(),
            }),
            _ => None,
        };
        let outcome = match event {
            Some(event) => {
                events
                    .send(event)
                    .await
                    .map_err(|_| RelayError::ControllerClosed)?;
                json!({ "queued": true })
            }
            None => match step {
                ScriptStep::ApproveProposal { id } => report(handle.approve_proposal(id).await)?,
                ScriptStep::RejectProposal { id } => report(handle.reject_proposal(id).await)?,
                ScriptStep::ApproveRequest { id } => report(handle.approve_request(id).await)?,
                ScriptStep::RejectRequest { id } => report(handle.reject_request(id).await)?,
                ScriptStep::CloseRequest => report(handle.close_request().await)?,
                ScriptStep::SwitchChain => report(handle.switch_chain().await)?,
                ScriptStep::ChainChanged { chain_id } => {
                    report(handle.chain_changed(ChainId(chain_id)).await)?
                }
                ScriptStep::Pair { uri } => report(handle.pair(uri).await)?,
                ScriptStep::Disconnect { topic } => report(handle.disconnect(topic).await)?,
                ScriptStep::Snapshot => report(handle.snapshot().await)?,
                ScriptStep::Proposal(_) | ScriptStep::Request(_) | ScriptStep::Deleted { .. } => {
                    continue
                }
            },
        };
        if outcome.get("error").and_then(Value::as_str)
            == Some(RelayError::ControllerClosed.to_string().as_str())
        {
            anyhow::bail!("relay controller stopped at line {line}");
        }
        reports.push(StepReport {
            line,
            step: name,
            outcome,
        });
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dry_run::DryRunSigner;
    use bridge_proto::Participant;
    use relay_engine::{event_channel, InMemorySessionManager, RelayConfig, RelayController};
    use std::sync::Arc;

    const SCRIPT: &str = r#"
# connect, sign once, then leave
{"step":"proposal","id":1,"requiredNamespaces":{"eip155":{"chains":["eip155:1"],"methods":["personal_sign"],"events":[]}}}
{"step":"approve_proposal","id":1}
{"step":"request","id":2,"topic":"topic-1","chainId":"eip155:1","method":"personal_sign","params":["0x6869","0x01"]}
{"step":"approve_request","id":2}
{"step":"approve_request","id":2}
{"step":"disconnect","topic":"topic-1"}
{"step":"snapshot"}
"#;

    #[test]
    fn scripts_skip_comments_and_blanks() {
        let steps = parse_script(SCRIPT).unwrap();
        assert_eq!(steps.len(), 7);
        assert_eq!(steps[0].0, 3);
        assert!(matches!(steps[0].1, ScriptStep::Proposal(ref p) if p.id == 1));
        assert_eq!(steps[6].1, ScriptStep::Snapshot);
    }

    #[test]
    fn bad_lines_name_their_line_number() {
        let err = parse_script("{\"step\":\"snapshot\"}\n{\"step\":\"dance\"}").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn replay_reports_each_step() {
        let manager = InMemorySessionManager::new(Participant {
            public_key: "wallet".into(),
            metadata: Default::default(),
        });
        let signer = Arc::new(DryRunSigner::new("0x01"));
        let controller =
            RelayController::new(RelayConfig::default(), manager.clone(), signer, ChainId(1));
        let (events_tx, events_rx) = event_channel(8);
        let (handle, task) = controller.spawn(events_rx);

        let reports = run_script(&handle, &events_tx, parse_script(SCRIPT).unwrap())
            .await
            .unwrap();
        assert_eq!(reports.len(), 7);
        assert_eq!(reports[1].outcome["ok"]["topic"], "topic-1");
        assert_eq!(reports[3].outcome["ok"]["outcome"], "approved");
        assert_eq!(
            reports[4].outcome["error"],
            "request 2 was already resolved"
        );
        assert_eq!(reports[5].outcome["ok"], Value::Null);
        assert_eq!(reports[6].outcome["ok"]["sessions"], json!([]));

        handle.shutdown().await;
        task.await.unwrap();
    }
}
