use std::collections::BTreeMap;

use bridge_proto::Session;
use tracing::debug;

use crate::classify::classify;
use crate::error::{RelayError, RelayResult};
use crate::session_manager::SessionManager;

/// A session we control ourselves is a loopback of our own pairing, not a
/// dApp connection.
pub fn is_loopback(session: &Session) -> bool {
    session.controller == session.local.public_key
}

/// Drops loopback sessions. Applying it twice changes nothing.
pub fn filter_active(sessions: BTreeMap<String, Session>) -> BTreeMap<String, Session> {
    sessions
        .into_iter()
        .filter(|(_, session)| !is_loopback(session))
        .collect()
}

/// The dApp sessions currently visible to the user, ordered by topic.
#[derive(Debug, Default, Clone)]
pub struct ActiveSessionRegistry {
    sessions: BTreeMap<String, Session>,
}

impl ActiveSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reloads from the session manager. On failure the previous set is kept.
    pub async fn refresh(&mut self, manager: &dyn SessionManager) -> RelayResult<usize> {
        let all = manager
            .active_sessions()
            .await
            .map_err(|err| RelayError::TransportFailure {
                message: classify(&err),
            })?;
        let total = all.len();
        self.sessions = filter_active(all);
        debug!(
            total,
            visible = self.sessions.len(),
            "refreshed active sessions"
        );
        Ok(self.sessions.len())
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn get(&self, topic: &str) -> Option<&Session> {
        self.sessions.get(topic)
    }

    pub fn topics(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_manager::InMemorySessionManager;
    use bridge_proto::{Namespaces, Participant};

    fn participant(key: &str) -> Participant {
        Participant {
            public_key: key.into(),
            metadata: Default::default(),
        }
    }

    fn session(topic: &str, controller: &str) -> Session {
        Session {
            topic: topic.into(),
            namespaces: Namespaces::new(),
            local: participant("wallet"),
            peer: participant("dapp"),
            controller: controller.into(),
            expiry: None,
        }
    }

    fn map(sessions: Vec<Session>) -> BTreeMap<String, Session> {
        sessions
            .into_iter()
            .map(|s| (s.topic.clone(), s))
            .collect()
    }

    #[test]
    fn loopback_sessions_are_excluded() {
        let filtered = filter_active(map(vec![
            session("a", "wallet"),
            session("b", "dapp"),
        ]));
        assert_eq!(filtered.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let sessions = map(vec![
            session("a", "wallet"),
            session("b", "dapp"),
            session("c", "someone-else"),
        ]);
        let once = filter_active(sessions);
        let twice = filter_active(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[tokio::test]
    async fn refresh_lists_dapp_sessions_by_topic() {
        let manager = InMemorySessionManager::new(participant("wallet"));
        manager.seed_session(session("c", "dapp")).await;
        manager.seed_session(session("a", "wallet")).await;
        manager.seed_session(session("b", "dapp")).await;

        let mut registry = ActiveSessionRegistry::new();
        assert_eq!(registry.refresh(manager.as_ref()).await.unwrap(), 2);
        assert_eq!(registry.topics(), vec!["b".to_string(), "c".to_string()]);
        assert!(registry.get("a").is_none());
    }
}
