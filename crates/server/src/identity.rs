// Identity resolution for display names.
//
// The collaboration engine never owns user accounts; it only maps a
// stable user id to a display name at connect time.

use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone)]
pub enum IdentityResolver {
    Postgres(sqlx::PgPool),
    Memory(Arc<RwLock<HashMap<Uuid, String>>>),
}

impl IdentityResolver {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    /// Look up a user's display name. `Ok(None)` means the id does not
    /// resolve; callers treat that as `UserNotFound`.
    pub async fn resolve_username(&self, user_id: Uuid) -> anyhow::Result<Option<String>> {
        match self {
            Self::Postgres(pool) => sqlx::query_scalar::<_, String>(
                "SELECT username FROM users WHERE id = $1",
            )
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .context("failed to query username for user"),
            Self::Memory(store) => Ok(store.read().await.get(&user_id).cloned()),
        }
    }

    pub async fn insert_user(&self, user_id: Uuid, username: &str) {
        if let Self::Memory(store) = self {
            store.write().await.insert(user_id, username.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_resolver_round_trips() {
        let resolver = IdentityResolver::memory();
        let user_id = Uuid::new_v4();
        resolver.insert_user(user_id, "alice").await;

        let username = resolver.resolve_username(user_id).await.expect("lookup should succeed");
        assert_eq!(username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn unknown_user_resolves_to_none() {
        let resolver = IdentityResolver::memory();
        let username =
            resolver.resolve_username(Uuid::new_v4()).await.expect("lookup should succeed");
        assert!(username.is_none());
    }
}
