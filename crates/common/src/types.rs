// Core domain types shared across the coedit crates.
//
// Wire field names are camelCase because that is what the browser
// clients send and expect; keep `rename_all` on every type here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A document as the collaboration engine sees it.
///
/// The engine only ever reads and writes `content` and `updated_at`;
/// everything else belongs to the document store. `updated_at` is
/// monotonically non-decreasing and is the sole basis for staleness
/// comparison; there is no per-operation sequence number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub content: String,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Ephemeral per-user presence state for one document session.
///
/// Created on first connect, mutated on typing/cursor/activity events,
/// deleted on disconnect, TTL expiry, or document deletion. Exclusively
/// owned by the presence tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUser {
    pub user_id: Uuid,
    pub username: String,
    #[serde(default)]
    pub cursor_position: u32,
    #[serde(default)]
    pub is_typing: bool,
    /// Hex color assigned once at connect time, stable for the session.
    pub color: String,
    pub last_active: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub connected_at: DateTime<Utc>,
}

impl ActiveUser {
    /// Try to parse an `ActiveUser` from a raw presence-store value.
    /// Returns `None` for entries older clients wrote in a shape we no
    /// longer understand; callers filter these out silently.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// The kind of edit an operation performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Splice `character` in at `position`.
    Insert,
    /// Remove exactly one character at `position`.
    Delete,
    /// Replace the entire content with `character`.
    Replace,
}

impl OperationType {
    /// Parse from the raw wire string. Anything unrecognized yields
    /// `None`; the reconciler drops such operations instead of failing
    /// the whole batch.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "insert" => Some(Self::Insert),
            "delete" => Some(Self::Delete),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }
}

/// A single edit operation.
///
/// Operations are ephemeral: only their cumulative effect on the
/// document content is persisted. `server_timestamp` and `user_id` are
/// assigned server-side on receipt and never trusted from the client.
///
/// `op_type` stays a raw string on the wire so a malformed type drops
/// one operation, never the whole batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EditOperation {
    #[serde(default)]
    pub document_id: Option<Uuid>,
    #[serde(rename = "type", default)]
    pub op_type: String,
    /// 0-based character offset; meaningful for insert/delete only.
    #[serde(default)]
    pub position: i64,
    /// Single char for insert, ignored for delete, full replacement
    /// text for replace.
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_timestamp: i64,
    /// Epoch milliseconds, stamped by the update reconciler.
    #[serde(default)]
    pub server_timestamp: Option<i64>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

impl EditOperation {
    /// The parsed operation type, or `None` for unrecognized values.
    pub fn operation_type(&self) -> Option<OperationType> {
        OperationType::parse(&self.op_type)
    }
}

/// An ordered batch of edit operations plus the client's belief of the
/// document's `updatedAt` when it started composing the batch.
///
/// Operations are applied in array order, each against the result of
/// the previous.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdateBatch {
    #[serde(default)]
    pub operations: Vec<EditOperation>,
    #[serde(default)]
    pub last_known_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn active_user_round_trips_camel_case() {
        let user = ActiveUser {
            user_id: Uuid::new_v4(),
            username: "alice".into(),
            cursor_position: 12,
            is_typing: true,
            color: "#3B82F6".into(),
            last_active: Utc::now(),
            is_active: true,
            connected_at: Utc::now(),
        };

        let value = serde_json::to_value(&user).expect("active user should serialize");
        assert!(value.get("userId").is_some());
        assert!(value.get("cursorPosition").is_some());
        assert!(value.get("isTyping").is_some());
        assert!(value.get("lastActive").is_some());

        let parsed = ActiveUser::from_json(&value).expect("active user should parse");
        assert_eq!(parsed, user);
    }

    #[test]
    fn active_user_from_json_rejects_missing_required_fields() {
        assert!(ActiveUser::from_json(&json!({ "cursorPosition": 3 })).is_none());
    }

    #[test]
    fn edit_operation_parses_minimal_client_payload() {
        let op: EditOperation = serde_json::from_value(json!({
            "type": "insert",
            "position": 4,
            "character": "x",
            "clientId": "client-1",
            "clientTimestamp": 1000
        }))
        .expect("operation should parse");

        assert_eq!(op.operation_type(), Some(OperationType::Insert));
        assert_eq!(op.position, 4);
        assert_eq!(op.character, "x");
        assert!(op.server_timestamp.is_none());
        assert!(op.user_id.is_none());
    }

    #[test]
    fn edit_operation_tolerates_unknown_type() {
        let op: EditOperation = serde_json::from_value(json!({
            "type": "transpose",
            "position": 0
        }))
        .expect("unknown type should still deserialize");
        assert_eq!(op.operation_type(), None);
    }

    #[test]
    fn batch_defaults_to_empty() {
        let batch: DocumentUpdateBatch = serde_json::from_value(json!({})).expect("empty batch");
        assert!(batch.operations.is_empty());
        assert!(batch.last_known_update.is_none());
        assert!(batch.client_id.is_none());
    }
}
