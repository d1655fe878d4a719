use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::tasks::UserId;

/// In-memory session tokens. Sessions do not survive a restart.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, UserId>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for `user` and returns its token.
    pub async fn create(&self, user: UserId) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.write().await.insert(token.clone(), user);
        token
    }

    pub async fn resolve(&self, token: &str) -> Option<UserId> {
        self.sessions.read().await.get(token).cloned()
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Drops every session belonging to `user`; returns how many there were.
    pub async fn revoke_user(&self, user: &UserId) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, owner| owner != user);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokens_resolve_until_revoked() {
        let store = SessionStore::new();
        let ada = UserId::from("ada");
        let first = store.create(ada.clone()).await;
        let second = store.create(ada.clone()).await;
        assert_ne!(first, second);
        assert_eq!(store.resolve(&first).await, Some(ada.clone()));

        assert!(store.revoke(&first).await);
        assert!(!store.revoke(&first).await);
        assert_eq!(store.resolve(&first).await, None);

        store.create(UserId::from("bob")).await;
        assert_eq!(store.revoke_user(&ada).await, 1);
        assert_eq!(store.resolve(&second).await, None);
    }
}
