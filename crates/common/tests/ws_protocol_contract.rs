use chrono::Utc;
use coedit_common::protocol::ws::{ClientMessage, DocumentTopic, ServerMessage, UserQueue};
use coedit_common::types::EditOperation;
use uuid::Uuid;

fn sample_operation() -> EditOperation {
    EditOperation {
        document_id: Some(Uuid::new_v4()),
        op_type: "insert".to_string(),
        position: 3,
        character: "x".to_string(),
        client_id: Some("client-1".to_string()),
        client_timestamp: 1_700_000_000_000,
        server_timestamp: Some(1_700_000_000_500),
        user_id: Some(Uuid::new_v4()),
    }
}

#[test]
fn server_message_shapes_match_contract() {
    let document_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let now = Utc::now();

    let samples = [
        (
            ServerMessage::ActiveUsers { document_id, users: vec![], timestamp: 1 },
            "ACTIVE_USERS",
            &["type", "documentId", "users", "timestamp"][..],
        ),
        (
            ServerMessage::UserJoin {
                document_id,
                user_id,
                username: "alice".to_string(),
                color: "#3B82F6".to_string(),
                timestamp: 1,
            },
            "USER_JOIN",
            &["type", "documentId", "userId", "username", "color", "timestamp"][..],
        ),
        (
            ServerMessage::UserLeave {
                document_id,
                user_id,
                username: "alice".to_string(),
                timestamp: 1,
            },
            "USER_LEAVE",
            &["type", "documentId", "userId", "username", "timestamp"][..],
        ),
        (
            ServerMessage::CursorUpdate {
                document_id,
                user_id,
                cursor_position: 9,
                is_typing: true,
                timestamp: 1,
            },
            "CURSOR_UPDATE",
            &["type", "documentId", "userId", "cursorPosition", "isTyping", "timestamp"][..],
        ),
        (
            ServerMessage::OperationUpdate {
                document_id,
                operation: sample_operation(),
                updated_at: now,
                updated_by: user_id,
                client_id: Some("client-1".to_string()),
                timestamp: 1,
            },
            "OPERATION_UPDATE",
            &["type", "documentId", "operation", "updatedAt", "updatedBy", "clientId", "timestamp"]
                [..],
        ),
        (
            ServerMessage::DocumentUpdate {
                document_id,
                content: "hello".to_string(),
                updated_at: now,
                updated_by: user_id,
                client_id: "client-1".to_string(),
                timestamp: 1,
            },
            "DOCUMENT_UPDATE",
            &["type", "documentId", "content", "updatedAt", "updatedBy", "clientId", "timestamp"]
                [..],
        ),
        (
            ServerMessage::VersionConflict {
                document_id,
                content: "server".to_string(),
                updated_at: now,
                updated_by: user_id,
                client_id: "server-conflict-x".to_string(),
                conflict_threshold: 3,
                timestamp: 1,
            },
            "VERSION_CONFLICT",
            &[
                "type",
                "documentId",
                "content",
                "updatedAt",
                "updatedBy",
                "clientId",
                "conflictThreshold",
                "timestamp",
            ][..],
        ),
        (
            ServerMessage::DocumentDeleted { document_id, timestamp: 1 },
            "DOCUMENT_DELETED",
            &["type", "documentId", "timestamp"][..],
        ),
        (
            ServerMessage::Error {
                code: "DOCUMENT_NOT_FOUND".to_string(),
                message: "document not found".to_string(),
                timestamp: 1,
            },
            "ERROR",
            &["type", "code", "message", "timestamp"][..],
        ),
    ];

    for (message, expected_type, expected_keys) in samples {
        let value = serde_json::to_value(&message).expect("server message should serialize");
        assert_eq!(value["type"], expected_type);
        for key in expected_keys {
            assert!(
                value.get(key).is_some(),
                "serialized `{expected_type}` frame must include `{key}`",
            );
        }
    }
}

#[test]
fn client_message_tags_are_snake_case() {
    let document_id = Uuid::new_v4();

    let connect = serde_json::to_value(ClientMessage::Connect { document_id })
        .expect("connect should serialize");
    assert_eq!(connect["type"], "connect");

    let batch = serde_json::to_value(ClientMessage::BatchOperations {
        document_id,
        batch: Default::default(),
    })
    .expect("batch should serialize");
    assert_eq!(batch["type"], "batch_operations");
    assert!(batch.get("operations").is_some());
}

#[test]
fn optional_fields_are_omitted_when_absent() {
    let document_id = Uuid::new_v4();

    let typing = serde_json::to_value(ClientMessage::Typing {
        document_id,
        cursor_position: None,
        is_typing: None,
    })
    .expect("typing should serialize");
    assert!(typing.get("cursorPosition").is_none());
    assert!(typing.get("isTyping").is_none());

    let ack = serde_json::to_value(ServerMessage::UpdateAck {
        document_id,
        operations_count: 0,
        content: String::new(),
        updated_at: Utc::now(),
        client_id: None,
        timestamp: 1,
    })
    .expect("ack should serialize");
    assert!(ack.get("clientId").is_none());
}

#[test]
fn destination_contract_is_stable() {
    let document_id = Uuid::new_v4();
    let expected = [
        format!("/topic/documents/{document_id}/active-users"),
        format!("/topic/documents/{document_id}/updates"),
        format!("/topic/documents/{document_id}/typing"),
        format!("/topic/documents/{document_id}/user-joined"),
        format!("/topic/documents/{document_id}/user-left"),
        format!("/topic/documents/{document_id}/conflicts"),
        format!("/topic/documents/{document_id}/deleted"),
    ];
    let actual: Vec<String> =
        DocumentTopic::ALL.iter().map(|topic| topic.destination(document_id)).collect();
    assert_eq!(actual, expected);

    assert_eq!(UserQueue::DocumentConnection.destination(), "/user/queue/document-connection");
    assert_eq!(
        UserQueue::DocumentUpdateResult.destination(),
        "/user/queue/document-update-result"
    );
    assert_eq!(UserQueue::OperationResult.destination(), "/user/queue/operation-result");
}
