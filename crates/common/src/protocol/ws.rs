// WebSocket message types for the coedit collaboration protocol.
//
// Inbound frames are `ClientMessage` (snake_case type tags). Outbound
// frames are an `Envelope`: a topic or private-queue destination plus a
// `ServerMessage` (SCREAMING_SNAKE type tags, matching what the browser
// clients switch on).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ActiveUser, DocumentUpdateBatch, EditOperation};

/// Client -> Server frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join a document session and subscribe to its topics.
    Connect { document_id: Uuid },
    /// Leave a document session.
    Disconnect { document_id: Uuid },
    /// Cursor/typing presence update. Omitted fields are left unchanged
    /// in the presence record.
    Typing {
        document_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor_position: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_typing: Option<bool>,
    },
    /// A single edit operation, applied as a one-element batch.
    Operation { document_id: Uuid, operation: EditOperation },
    /// An ordered batch of operations with a staleness guard.
    BatchOperations {
        document_id: Uuid,
        #[serde(flatten)]
        batch: DocumentUpdateBatch,
    },
}

/// Server -> Client frames.
///
/// Every message carries `type` and `timestamp` (epoch milliseconds);
/// document-scoped messages carry `documentId`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full roster snapshot for a document.
    ActiveUsers { document_id: Uuid, users: Vec<ActiveUser>, timestamp: i64 },
    /// A user joined the document for the first time this session.
    UserJoin { document_id: Uuid, user_id: Uuid, username: String, color: String, timestamp: i64 },
    /// A user left the document.
    UserLeave { document_id: Uuid, user_id: Uuid, username: String, timestamp: i64 },
    /// Cursor/typing presence change.
    CursorUpdate {
        document_id: Uuid,
        user_id: Uuid,
        cursor_position: u32,
        is_typing: bool,
        timestamp: i64,
    },
    /// One confirmed edit operation, broadcast individually so
    /// subscribers can replay them in order.
    OperationUpdate {
        document_id: Uuid,
        operation: EditOperation,
        updated_at: DateTime<Utc>,
        updated_by: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        timestamp: i64,
    },
    /// Full-content document notification (restore/save outside the
    /// operation path).
    DocumentUpdate {
        document_id: Uuid,
        content: String,
        updated_at: DateTime<Utc>,
        updated_by: Uuid,
        client_id: String,
        timestamp: i64,
    },
    /// The client's view is too stale; carries the server's content.
    VersionConflict {
        document_id: Uuid,
        content: String,
        updated_at: DateTime<Utc>,
        updated_by: Uuid,
        client_id: String,
        conflict_threshold: i64,
        timestamp: i64,
    },
    /// The document was deleted; sessions should close their editors.
    DocumentDeleted { document_id: Uuid, timestamp: i64 },
    /// Private connect acknowledgement.
    Connected { document_id: Uuid, timestamp: i64 },
    /// Private acknowledgement for a single operation.
    OperationAck {
        document_id: Uuid,
        operation: EditOperation,
        updated_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        timestamp: i64,
    },
    /// Private acknowledgement for a batch.
    UpdateAck {
        document_id: Uuid,
        operations_count: usize,
        content: String,
        updated_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        timestamp: i64,
    },
    /// Private error reply; never disrupts the session loop.
    Error { code: String, message: String, timestamp: i64 },
}

/// An outbound frame: destination plus message, flattened so clients
/// see `{"destination": ..., "type": ..., ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub destination: String,
    #[serde(flatten)]
    pub message: ServerMessage,
}

/// Document-scoped broadcast topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentTopic {
    ActiveUsers,
    Updates,
    Typing,
    UserJoined,
    UserLeft,
    Conflicts,
    Deleted,
}

impl DocumentTopic {
    pub const ALL: [DocumentTopic; 7] = [
        Self::ActiveUsers,
        Self::Updates,
        Self::Typing,
        Self::UserJoined,
        Self::UserLeft,
        Self::Conflicts,
        Self::Deleted,
    ];

    const fn suffix(self) -> &'static str {
        match self {
            Self::ActiveUsers => "active-users",
            Self::Updates => "updates",
            Self::Typing => "typing",
            Self::UserJoined => "user-joined",
            Self::UserLeft => "user-left",
            Self::Conflicts => "conflicts",
            Self::Deleted => "deleted",
        }
    }

    pub fn destination(self, document_id: Uuid) -> String {
        format!("/topic/documents/{document_id}/{}", self.suffix())
    }
}

/// Private per-user queues for acks and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserQueue {
    DocumentConnection,
    DocumentUpdateResult,
    OperationResult,
    Errors,
}

impl UserQueue {
    pub const fn destination(self) -> &'static str {
        match self {
            Self::DocumentConnection => "/user/queue/document-connection",
            Self::DocumentUpdateResult => "/user/queue/document-update-result",
            Self::OperationResult => "/user/queue/operation-result",
            Self::Errors => "/user/queue/errors",
        }
    }
}

pub fn decode_client_message(raw: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(raw)
}

pub fn encode_envelope(envelope: &Envelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}
