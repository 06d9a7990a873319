// Shared key-value store with per-key TTL and set membership.
//
// Speaks the same surface as the Redis deployment it stands in for:
// SADD/SMEMBERS/SREM/SISMEMBER on set keys, GET/SET/DEL on value keys,
// EXPIRE on either. Each operation takes the lock once and is atomic;
// sequences spanning multiple keys are NOT transactional, and the
// tracker above this must tolerate a roster entry whose state key has
// already expired.
//
// Expiry is lazy: a key past its deadline reads as absent and is
// dropped on the next write that touches the map.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum Slot {
    Value(serde_json::Value),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|deadline| now < deadline).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PresenceKv {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl PresenceKv {
    /// Add a member to the set at `key`, creating the set if needed.
    /// Returns true if the member was newly added.
    pub async fn set_add(&self, key: &str, member: &str) -> bool {
        let now = Utc::now();
        let mut guard = self.entries.write().await;
        match guard.get_mut(key).filter(|entry| entry.is_live(now)) {
            Some(Entry { slot: Slot::Set(members), .. }) => members.insert(member.to_string()),
            _ => {
                let mut members = HashSet::new();
                members.insert(member.to_string());
                guard.insert(
                    key.to_string(),
                    Entry { slot: Slot::Set(members), expires_at: None },
                );
                true
            }
        }
    }

    pub async fn set_members(&self, key: &str) -> Vec<String> {
        let now = Utc::now();
        let guard = self.entries.read().await;
        match guard.get(key).filter(|entry| entry.is_live(now)) {
            Some(Entry { slot: Slot::Set(members), .. }) => members.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub async fn set_contains(&self, key: &str, member: &str) -> bool {
        let now = Utc::now();
        let guard = self.entries.read().await;
        matches!(
            guard.get(key).filter(|entry| entry.is_live(now)),
            Some(Entry { slot: Slot::Set(members), .. }) if members.contains(member)
        )
    }

    /// Remove a member; an emptied set stays present until its TTL
    /// fires, matching the backing store's SREM behavior closely enough
    /// for the tracker's needs.
    pub async fn set_remove(&self, key: &str, member: &str) -> bool {
        let now = Utc::now();
        let mut guard = self.entries.write().await;
        match guard.get_mut(key).filter(|entry| entry.is_live(now)) {
            Some(Entry { slot: Slot::Set(members), .. }) => members.remove(member),
            _ => false,
        }
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Utc::now();
        let guard = self.entries.read().await;
        match guard.get(key).filter(|entry| entry.is_live(now)) {
            Some(Entry { slot: Slot::Value(value), .. }) => Some(value.clone()),
            _ => None,
        }
    }

    /// Set a value key. Clears any existing TTL, as SET does.
    pub async fn put(&self, key: &str, value: serde_json::Value) {
        let mut guard = self.entries.write().await;
        guard.insert(key.to_string(), Entry { slot: Slot::Value(value), expires_at: None });
    }

    pub async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Set a TTL on an existing live key; no-op when the key is absent
    /// or already expired.
    pub async fn expire(&self, key: &str, ttl: Duration) {
        let now = Utc::now();
        let mut guard = self.entries.write().await;
        if let Some(entry) = guard.get_mut(key).filter(|entry| entry.is_live(now)) {
            entry.expires_at = Some(now + ttl);
        }
    }
}
