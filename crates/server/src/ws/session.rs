use coedit_common::protocol::ws::{DocumentTopic, Envelope, ServerMessage};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// One live WebSocket connection for one authenticated user.
#[derive(Debug, Clone)]
struct SessionRecord {
    user_id: Uuid,
    outbound: mpsc::UnboundedSender<Envelope>,
    subscriptions: HashSet<String>,
}

/// Registry of live sessions and their topic subscriptions.
///
/// Fan-out is in-process: publishing walks the subscribed sessions and
/// pushes on each outbound channel. A closed channel (socket already
/// gone) just reduces the delivered count; delivery is best-effort.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionRecord>>>,
}

impl SessionRegistry {
    pub async fn register(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        outbound: mpsc::UnboundedSender<Envelope>,
    ) {
        let mut guard = self.sessions.write().await;
        guard.insert(
            session_id,
            SessionRecord { user_id, outbound, subscriptions: HashSet::new() },
        );
    }

    pub async fn unregister(&self, session_id: Uuid) {
        self.sessions.write().await.remove(&session_id);
    }

    pub async fn subscribe(&self, session_id: Uuid, destination: String) -> bool {
        let mut guard = self.sessions.write().await;
        match guard.get_mut(&session_id) {
            Some(session) => {
                session.subscriptions.insert(destination);
                true
            }
            None => false,
        }
    }

    /// Subscribe a session to all topics of one document.
    pub async fn subscribe_document(&self, session_id: Uuid, document_id: Uuid) -> bool {
        let mut guard = self.sessions.write().await;
        match guard.get_mut(&session_id) {
            Some(session) => {
                for topic in DocumentTopic::ALL {
                    session.subscriptions.insert(topic.destination(document_id));
                }
                true
            }
            None => false,
        }
    }

    pub async fn unsubscribe_document(&self, session_id: Uuid, document_id: Uuid) {
        let mut guard = self.sessions.write().await;
        if let Some(session) = guard.get_mut(&session_id) {
            for topic in DocumentTopic::ALL {
                session.subscriptions.remove(&topic.destination(document_id));
            }
        }
    }

    pub async fn is_subscribed(&self, session_id: Uuid, destination: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map(|session| session.subscriptions.contains(destination))
            .unwrap_or(false)
    }

    /// Fan out a message to every session subscribed to `destination`.
    /// Returns the number of sessions it was delivered to.
    pub async fn publish(&self, destination: &str, message: ServerMessage) -> usize {
        let mut recipients = Vec::new();
        {
            let guard = self.sessions.read().await;
            for session in guard.values() {
                if session.subscriptions.contains(destination) {
                    recipients.push(session.outbound.clone());
                }
            }
        }

        let mut sent_count = 0;
        for recipient in recipients {
            let envelope =
                Envelope { destination: destination.to_string(), message: message.clone() };
            if recipient.send(envelope).is_ok() {
                sent_count += 1;
            }
        }

        sent_count
    }

    /// Deliver a private message to every live session of one user.
    pub async fn send_to_user(
        &self,
        user_id: Uuid,
        destination: &str,
        message: ServerMessage,
    ) -> usize {
        let mut recipients = Vec::new();
        {
            let guard = self.sessions.read().await;
            for session in guard.values() {
                if session.user_id == user_id {
                    recipients.push(session.outbound.clone());
                }
            }
        }

        let mut sent_count = 0;
        for recipient in recipients {
            let envelope =
                Envelope { destination: destination.to_string(), message: message.clone() };
            if recipient.send(envelope).is_ok() {
                sent_count += 1;
            }
        }

        sent_count
    }
}
