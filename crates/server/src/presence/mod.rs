// Presence tracking (roster membership and per-user session state).

pub mod kv;

use chrono::{Duration, Utc};
use coedit_common::types::ActiveUser;
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CollabError;
use crate::identity::IdentityResolver;
use kv::PresenceKv;

/// TTL on roster and presence-record keys; the sole automatic
/// garbage-collection mechanism for abandoned sessions.
pub const PRESENCE_TTL_HOURS: i64 = 24;

const DOCUMENT_USERS_PREFIX: &str = "document:users:";
const USER_STATE_PREFIX: &str = "document:user:state:";

/// Session color palette; one entry is assigned per connect and stays
/// stable for the session.
const COLOR_PALETTE: [&str; 10] = [
    "#3B82F6", "#10B981", "#F59E0B", "#EF4444", "#8B5CF6", "#06B6D4", "#F97316", "#84CC16",
    "#EC4899", "#6366F1",
];

/// Tracks which users are connected to which documents, and each
/// user's ephemeral cursor/typing state.
///
/// Exclusively owns the presence records; no other component mutates
/// them directly.
#[derive(Clone)]
pub struct PresenceTracker {
    kv: PresenceKv,
    identity: IdentityResolver,
}

fn roster_key(document_id: Uuid) -> String {
    format!("{DOCUMENT_USERS_PREFIX}{document_id}")
}

fn state_key(document_id: Uuid, user_id: Uuid) -> String {
    format!("{USER_STATE_PREFIX}{document_id}:{user_id}")
}

fn pick_color() -> String {
    let index = rand::thread_rng().gen_range(0..COLOR_PALETTE.len());
    COLOR_PALETTE[index].to_string()
}

impl PresenceTracker {
    pub fn new(kv: PresenceKv, identity: IdentityResolver) -> Self {
        Self { kv, identity }
    }

    /// Connect a user to a document. Returns `Ok(false)` for an
    /// idempotent re-connect (already a roster member, nothing else
    /// happens) and `Ok(true)` for a new connection.
    pub async fn connect(&self, document_id: Uuid, user_id: Uuid) -> Result<bool, CollabError> {
        let roster = roster_key(document_id);
        let member = user_id.to_string();

        if self.kv.set_contains(&roster, &member).await {
            debug!(%document_id, %user_id, "user already connected");
            return Ok(false);
        }

        info!(%document_id, %user_id, "connecting user to document");

        self.kv.set_add(&roster, &member).await;
        self.kv.expire(&roster, Duration::hours(PRESENCE_TTL_HOURS)).await;

        let username = match self.identity.resolve_username(user_id).await? {
            Some(username) => username,
            None => {
                // Abandon the connection attempt without leaving an
                // orphan roster entry behind.
                self.kv.set_remove(&roster, &member).await;
                return Err(CollabError::UserNotFound(user_id));
            }
        };

        let now = Utc::now();
        let user = ActiveUser {
            user_id,
            username,
            cursor_position: 0,
            is_typing: false,
            color: pick_color(),
            last_active: now,
            is_active: true,
            connected_at: now,
        };

        let state = state_key(document_id, user_id);
        self.kv.put(&state, serde_json::to_value(&user).unwrap_or_default()).await;
        self.kv.expire(&state, Duration::hours(PRESENCE_TTL_HOURS)).await;

        info!(%document_id, %user_id, "user connected to document");
        Ok(true)
    }

    /// Disconnect a user. Silent no-op when the user is not a roster
    /// member; otherwise removes both the roster membership and the
    /// presence record, never just one.
    pub async fn disconnect(&self, document_id: Uuid, user_id: Uuid) {
        let roster = roster_key(document_id);
        let member = user_id.to_string();

        if !self.kv.set_contains(&roster, &member).await {
            debug!(%document_id, %user_id, "user not connected, nothing to disconnect");
            return;
        }

        info!(%document_id, %user_id, "disconnecting user from document");
        self.kv.set_remove(&roster, &member).await;
        self.kv.delete(&state_key(document_id, user_id)).await;
    }

    /// Partial presence update: only supplied fields are overwritten;
    /// last-active/is-active and the TTL always refresh. Silent no-op
    /// when the user has no presence record; a record is never created
    /// implicitly here.
    pub async fn update_state(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        cursor_position: Option<u32>,
        is_typing: Option<bool>,
    ) {
        let state = state_key(document_id, user_id);
        let Some(mut user) = self.load_state(&state).await else {
            return;
        };

        if let Some(cursor_position) = cursor_position {
            user.cursor_position = cursor_position;
        }
        if let Some(is_typing) = is_typing {
            user.is_typing = is_typing;
        }
        user.last_active = Utc::now();
        user.is_active = true;

        self.kv.put(&state, serde_json::to_value(&user).unwrap_or_default()).await;
        self.kv.expire(&state, Duration::hours(PRESENCE_TTL_HOURS)).await;
    }

    /// Keep a session alive from read/poll activity. A full connect
    /// when the user is not a roster member; otherwise a last-active
    /// and TTL refresh on both keys.
    pub async fn register_activity(
        &self,
        document_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), CollabError> {
        if !self.is_connected(document_id, user_id).await {
            self.connect(document_id, user_id).await?;
            return Ok(());
        }

        let state = state_key(document_id, user_id);
        if let Some(mut user) = self.load_state(&state).await {
            user.last_active = Utc::now();
            user.is_active = true;
            self.kv.put(&state, serde_json::to_value(&user).unwrap_or_default()).await;
        }

        self.kv.expire(&roster_key(document_id), Duration::hours(PRESENCE_TTL_HOURS)).await;
        self.kv.expire(&state, Duration::hours(PRESENCE_TTL_HOURS)).await;
        Ok(())
    }

    /// Roster snapshot, optionally excluding one user (the caller, when
    /// building an "others" view). Members whose presence record has
    /// expired or never materialized are filtered out silently: the
    /// connect/disconnect sequences span two keys without a
    /// transaction, so this gap is expected, not an error.
    pub async fn list_active_users(
        &self,
        document_id: Uuid,
        exclude: Option<Uuid>,
    ) -> Vec<ActiveUser> {
        let members = self.kv.set_members(&roster_key(document_id)).await;
        let mut users = Vec::with_capacity(members.len());

        for member in members {
            let Ok(user_id) = Uuid::parse_str(&member) else {
                warn!(%document_id, member, "unparseable roster member");
                continue;
            };
            if exclude == Some(user_id) {
                continue;
            }
            if let Some(user) = self.load_state(&state_key(document_id, user_id)).await {
                users.push(user);
            }
        }

        users
    }

    pub async fn is_connected(&self, document_id: Uuid, user_id: Uuid) -> bool {
        self.kv.set_contains(&roster_key(document_id), &user_id.to_string()).await
    }

    /// Remove the roster and every presence record for a document
    /// (invoked on document deletion).
    pub async fn purge_document(&self, document_id: Uuid) {
        let roster = roster_key(document_id);
        for member in self.kv.set_members(&roster).await {
            if let Ok(user_id) = Uuid::parse_str(&member) {
                self.kv.delete(&state_key(document_id, user_id)).await;
            }
        }
        self.kv.delete(&roster).await;
    }

    /// Test-only hook: drop just the presence-record key, simulating a
    /// TTL expiry whose roster membership has not been cleaned up.
    #[cfg(test)]
    pub(crate) async fn drop_state_for_tests(&self, document_id: Uuid, user_id: Uuid) {
        self.kv.delete(&state_key(document_id, user_id)).await;
    }

    async fn load_state(&self, key: &str) -> Option<ActiveUser> {
        let value = self.kv.get(key).await?;
        let user = ActiveUser::from_json(&value);
        if user.is_none() {
            warn!(key, "unparseable presence record, skipping");
        }
        user
    }
}
