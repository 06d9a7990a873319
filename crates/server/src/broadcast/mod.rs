// Broadcast dispatcher: composes typed notifications and fans them out
// to topic subscribers or a user's private queues.
//
// Delivery is best-effort, at-most-once, no retry: a notification that
// reaches nobody never rolls back the state mutation that produced it.

use chrono::{DateTime, Utc};
use coedit_common::protocol::ws::{DocumentTopic, ServerMessage, UserQueue};
use coedit_common::types::{ActiveUser, Document, EditOperation};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::reconcile::CONFLICT_THRESHOLD_SECONDS;
use crate::ws::session::SessionRegistry;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Stateless message composer over the session registry.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    async fn publish(&self, destination: String, message: ServerMessage) {
        let delivered = self.registry.publish(&destination, message).await;
        if delivered == 0 {
            debug!(destination, "broadcast reached no subscribers");
        }
    }

    /// Full roster snapshot to the active-users topic.
    pub async fn notify_active_users(&self, document_id: Uuid, users: Vec<ActiveUser>) {
        self.publish(
            DocumentTopic::ActiveUsers.destination(document_id),
            ServerMessage::ActiveUsers { document_id, users, timestamp: now_millis() },
        )
        .await;
    }

    pub async fn notify_user_joined(&self, document_id: Uuid, user: &ActiveUser) {
        self.publish(
            DocumentTopic::UserJoined.destination(document_id),
            ServerMessage::UserJoin {
                document_id,
                user_id: user.user_id,
                username: user.username.clone(),
                color: user.color.clone(),
                timestamp: now_millis(),
            },
        )
        .await;
    }

    pub async fn notify_user_left(&self, document_id: Uuid, user_id: Uuid, username: String) {
        self.publish(
            DocumentTopic::UserLeft.destination(document_id),
            ServerMessage::UserLeave { document_id, user_id, username, timestamp: now_millis() },
        )
        .await;
    }

    pub async fn notify_cursor_update(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        cursor_position: u32,
        is_typing: bool,
    ) {
        self.publish(
            DocumentTopic::Typing.destination(document_id),
            ServerMessage::CursorUpdate {
                document_id,
                user_id,
                cursor_position,
                is_typing,
                timestamp: now_millis(),
            },
        )
        .await;
    }

    /// One confirmed operation to the updates topic; the reconciler
    /// calls this once per confirmed operation so subscribers can
    /// replay them in order.
    pub async fn notify_operation(
        &self,
        document_id: Uuid,
        operation: EditOperation,
        updated_at: DateTime<Utc>,
        updated_by: Uuid,
        client_id: Option<String>,
    ) {
        self.publish(
            DocumentTopic::Updates.destination(document_id),
            ServerMessage::OperationUpdate {
                document_id,
                operation,
                updated_at,
                updated_by,
                client_id,
                timestamp: now_millis(),
            },
        )
        .await;
    }

    /// Full-content notification (restore/save outside the operation
    /// path).
    pub async fn notify_document_update(
        &self,
        document: &Document,
        updated_by: Uuid,
        client_id: String,
    ) {
        self.publish(
            DocumentTopic::Updates.destination(document.id),
            ServerMessage::DocumentUpdate {
                document_id: document.id,
                content: document.content.clone(),
                updated_at: document.updated_at,
                updated_by,
                client_id,
                timestamp: now_millis(),
            },
        )
        .await;
    }

    /// Version conflict carrying the server's current state, published
    /// to both the conflicts topic and the updates topic so clients
    /// that only follow updates still resynchronize.
    pub async fn notify_conflict(&self, document: &Document) {
        let message = ServerMessage::VersionConflict {
            document_id: document.id,
            content: document.content.clone(),
            updated_at: document.updated_at,
            updated_by: document.created_by,
            client_id: format!("server-conflict-{}", Uuid::new_v4()),
            conflict_threshold: CONFLICT_THRESHOLD_SECONDS,
            timestamp: now_millis(),
        };

        self.publish(DocumentTopic::Conflicts.destination(document.id), message.clone()).await;
        self.publish(DocumentTopic::Updates.destination(document.id), message).await;
    }

    pub async fn notify_document_deleted(&self, document_id: Uuid) {
        self.publish(
            DocumentTopic::Deleted.destination(document_id),
            ServerMessage::DocumentDeleted { document_id, timestamp: now_millis() },
        )
        .await;
    }

    // ── Private queues ──────────────────────────────────────────────

    pub async fn send_connected_ack(&self, user_id: Uuid, document_id: Uuid) {
        self.registry
            .send_to_user(
                user_id,
                UserQueue::DocumentConnection.destination(),
                ServerMessage::Connected { document_id, timestamp: now_millis() },
            )
            .await;
    }

    pub async fn send_operation_ack(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        operation: EditOperation,
        updated_at: DateTime<Utc>,
        client_id: Option<String>,
    ) {
        self.registry
            .send_to_user(
                user_id,
                UserQueue::OperationResult.destination(),
                ServerMessage::OperationAck {
                    document_id,
                    operation,
                    updated_at,
                    client_id,
                    timestamp: now_millis(),
                },
            )
            .await;
    }

    pub async fn send_update_ack(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        operations_count: usize,
        content: String,
        updated_at: DateTime<Utc>,
        client_id: Option<String>,
    ) {
        self.registry
            .send_to_user(
                user_id,
                UserQueue::DocumentUpdateResult.destination(),
                ServerMessage::UpdateAck {
                    document_id,
                    operations_count,
                    content,
                    updated_at,
                    client_id,
                    timestamp: now_millis(),
                },
            )
            .await;
    }

    pub async fn send_error(&self, user_id: Uuid, code: &str, message: String) {
        self.registry
            .send_to_user(
                user_id,
                UserQueue::Errors.destination(),
                ServerMessage::Error {
                    code: code.to_string(),
                    message,
                    timestamp: now_millis(),
                },
            )
            .await;
    }
}
