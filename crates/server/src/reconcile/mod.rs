// Update reconciliation: applies batches of character edit operations
// to a document under a per-document lock, with a last-write-wins
// staleness check instead of operational transforms.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use coedit_common::types::{Document, DocumentUpdateBatch, EditOperation, OperationType};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::error::CollabError;
use crate::presence::PresenceTracker;
use crate::store::DocumentStore;

/// A batch whose client state trails the server copy by more than this
/// many seconds is rejected wholesale as a version conflict.
pub const CONFLICT_THRESHOLD_SECONDS: i64 = 3;

/// Result of applying one batch. On conflict the document is the
/// server's copy, untouched.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub document: Document,
    pub applied: usize,
    pub conflict: bool,
}

pub struct UpdateReconciler {
    docs: DocumentStore,
    presence: Arc<PresenceTracker>,
    broadcast: Broadcaster,
    doc_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UpdateReconciler {
    pub fn new(docs: DocumentStore, presence: Arc<PresenceTracker>, broadcast: Broadcaster) -> Self {
        Self { docs, presence, broadcast, doc_locks: Mutex::new(HashMap::new()) }
    }

    async fn lock_for(&self, document_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.doc_locks.lock().await;
        Arc::clone(locks.entry(document_id).or_default())
    }

    /// Drop the map entry once no other task holds or awaits the lock.
    /// Two strong references mean the map entry plus our own handle.
    async fn release_lock(&self, document_id: Uuid, lock: &Arc<Mutex<()>>) {
        let mut locks = self.doc_locks.lock().await;
        if Arc::strong_count(lock) == 2 {
            locks.remove(&document_id);
        }
    }

    /// Apply a batch for one user. Batches for the same document are
    /// serialized; the staleness check, the edits, and the save happen
    /// under one critical section so no interleaved writer can slip in
    /// between check and commit.
    pub async fn apply(
        &self,
        document_id: Uuid,
        batch: DocumentUpdateBatch,
        acting_user: Uuid,
    ) -> Result<ApplyOutcome, CollabError> {
        let lock = self.lock_for(document_id).await;
        let guard = lock.lock().await;
        let outcome = self.apply_locked(document_id, batch, acting_user).await;
        drop(guard);
        self.release_lock(document_id, &lock).await;
        outcome
    }

    async fn apply_locked(
        &self,
        document_id: Uuid,
        batch: DocumentUpdateBatch,
        acting_user: Uuid,
    ) -> Result<ApplyOutcome, CollabError> {
        let mut document = self
            .docs
            .load_by_id(document_id)
            .await?
            .ok_or(CollabError::DocumentNotFound(document_id))?;

        // Staleness gate: a client that last saw the document more
        // than the threshold before the server's copy must resync; no
        // check when the client never sent a baseline.
        if let Some(last_known) = batch.last_known_update {
            let gap = document.updated_at.signed_duration_since(last_known);
            if gap.num_seconds() > CONFLICT_THRESHOLD_SECONDS {
                warn!(
                    %document_id,
                    %acting_user,
                    gap_seconds = gap.num_seconds(),
                    "stale batch rejected as version conflict"
                );
                self.broadcast.notify_conflict(&document).await;
                return Ok(ApplyOutcome { document, applied: 0, conflict: true });
            }
        }

        // An empty batch touches nothing; a non-empty batch always
        // persists, even when every operation in it gets dropped, so
        // `updated_at` reflects the write attempt.
        if batch.operations.is_empty() {
            debug!(%document_id, "batch carried no operations");
            return Ok(ApplyOutcome { document, applied: 0, conflict: false });
        }

        let now = Utc::now();
        let mut content = document.content.clone();
        let mut confirmed: Vec<EditOperation> = Vec::with_capacity(batch.operations.len());

        for mut op in batch.operations {
            op.server_timestamp = Some(now.timestamp_millis());
            op.user_id = Some(acting_user);
            op.document_id = Some(document_id);

            let Some(op_type) = op.operation_type() else {
                warn!(%document_id, op_type = %op.op_type, "dropping operation with unknown type");
                continue;
            };
            match apply_operation(&content, op_type, op.position, &op.character) {
                Some(next) => {
                    content = next;
                    confirmed.push(op);
                }
                None => {
                    warn!(
                        %document_id,
                        position = op.position,
                        ?op_type,
                        "dropping out-of-range operation"
                    );
                }
            }
        }

        document.content = content;
        document.updated_at = now;
        let document = self.docs.save(&document).await?;

        // Presence refresh is best-effort; the edit already committed.
        if let Err(err) = self.presence.register_activity(document_id, acting_user).await {
            warn!(%document_id, %acting_user, %err, "presence refresh after edit failed");
        }

        let applied = confirmed.len();
        for op in confirmed {
            // The request-level client id identifies the echo to
            // suppress; the per-op id only fills in when absent.
            let client_id = batch.client_id.clone().or_else(|| op.client_id.clone());
            self.broadcast
                .notify_operation(document_id, op, document.updated_at, acting_user, client_id)
                .await;
        }

        Ok(ApplyOutcome { document, applied, conflict: false })
    }
}

/// Apply one operation. Insert and delete work at a character offset,
/// not a byte offset, and return None when the position falls outside
/// the valid range. Replace swaps the whole content unconditionally
/// (full-content save), ignoring the position.
fn apply_operation(
    content: &str,
    op_type: OperationType,
    position: i64,
    character: &str,
) -> Option<String> {
    match op_type {
        OperationType::Replace => Some(character.to_string()),
        OperationType::Insert => {
            let position = usize::try_from(position).ok()?;
            if position > content.chars().count() {
                return None;
            }
            let byte = byte_offset(content, position);
            let mut next = String::with_capacity(content.len() + character.len());
            next.push_str(&content[..byte]);
            next.push_str(character);
            next.push_str(&content[byte..]);
            Some(next)
        }
        OperationType::Delete => {
            let position = usize::try_from(position).ok()?;
            if position >= content.chars().count() {
                return None;
            }
            let start = byte_offset(content, position);
            let end = byte_offset(content, position + 1);
            let mut next = String::with_capacity(content.len());
            next.push_str(&content[..start]);
            next.push_str(&content[end..]);
            Some(next)
        }
    }
}

fn byte_offset(content: &str, char_index: usize) -> usize {
    content
        .char_indices()
        .nth(char_index)
        .map(|(byte, _)| byte)
        .unwrap_or(content.len())
}
