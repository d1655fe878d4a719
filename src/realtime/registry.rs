use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::Channel;
use crate::tasks::UserId;

pub type ChannelHandle = Arc<dyn Channel>;

/// Open push channels, keyed by user.
///
/// Constructed once at startup and shared by the socket sessions (writers) and
/// the dispatcher (reader). Channels are told apart by handle identity, never
/// by content.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<UserId, Vec<ChannelHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `channel` to `user`'s set. Returns `false` if that very handle was
    /// already registered.
    pub async fn register(&self, user: UserId, channel: ChannelHandle) -> bool {
        let mut entries = self.entries.write().await;
        let channels = entries.entry(user).or_default();
        if channels.iter().any(|c| Arc::ptr_eq(c, &channel)) {
            return false;
        }
        channels.push(channel);
        true
    }

    /// Removes `channel` from `user`'s set and drops the entry once it is empty.
    /// Returns whether the channel was registered.
    pub async fn unregister(&self, user: &UserId, channel: &ChannelHandle) -> bool {
        let mut entries = self.entries.write().await;
        let Some(channels) = entries.get_mut(user) else {
            return false;
        };
        let before = channels.len();
        channels.retain(|c| !Arc::ptr_eq(c, channel));
        let removed = channels.len() != before;
        if channels.is_empty() {
            entries.remove(user);
        }
        removed
    }

    /// Removes every channel of `user` and closes each one. Returns how many
    /// there were.
    pub async fn drop_user(&self, user: &UserId) -> usize {
        let channels = self.entries.write().await.remove(user).unwrap_or_default();
        for channel in &channels {
            channel.close();
        }
        channels.len()
    }

    /// A snapshot of `user`'s channels; empty if the user has none.
    pub async fn channels_for(&self, user: &UserId) -> Vec<ChannelHandle> {
        self.entries
            .read()
            .await
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn contains(&self, user: &UserId) -> bool {
        self.entries.read().await.contains_key(user)
    }

    /// Total number of registered channels across all users.
    pub async fn connections(&self) -> usize {
        self.entries.read().await.values().map(Vec::len).sum()
    }
}
