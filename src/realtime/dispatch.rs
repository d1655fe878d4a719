use std::sync::Arc;

use chrono::Utc;

use super::{ConnectionRegistry, Notice, RealtimeError, ServerMessage};
use crate::tasks::UserId;

/// Fans one notice out to every open channel of a user.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Sends `notice` to `user` and returns how many channels took it.
    ///
    /// Every channel gets the same encoded envelope. Channels that are closed
    /// or refuse the frame are skipped without error; removing them is the
    /// socket session's job. A user with no channels yields `Ok(0)`.
    pub async fn dispatch(&self, user: &UserId, notice: &Notice) -> Result<usize, RealtimeError> {
        let channels = self.registry.channels_for(user).await;
        if channels.is_empty() {
            tracing::debug!(user_id = %user, "no open channels, nothing delivered");
            return Ok(0);
        }

        let text = ServerMessage::Notification {
            payload: notice.clone(),
            time: Utc::now(),
        }
        .to_text()?;

        let mut delivered = 0;
        for channel in channels.iter().filter(|c| c.is_open()) {
            match channel.send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(user_id = %user, error = %e, "skipped channel"),
            }
        }

        tracing::debug!(user_id = %user, delivered, "notification dispatched");
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ChannelHandle;
    use crate::realtime::registry::tests::FakeChannel;

    fn setup() -> (Dispatcher, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        (Dispatcher::new(Arc::clone(&registry)), registry)
    }

    fn notice() -> Notice {
        Notice::Test {
            message: "hello".into(),
        }
    }

    #[tokio::test]
    async fn unknown_user_gets_zero() {
        let (dispatcher, _) = setup();
        let delivered = dispatcher
            .dispatch(&UserId::from("nobody"), &notice())
            .await
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn same_envelope_to_every_open_channel() {
        let (dispatcher, registry) = setup();
        let ada = UserId::from("ada");
        let a = Arc::new(FakeChannel::default());
        let b = Arc::new(FakeChannel::default());
        let closed = Arc::new(FakeChannel::default());
        closed.close();
        for channel in [&a, &b, &closed] {
            let handle: ChannelHandle = channel.clone();
            registry.register(ada.clone(), handle).await;
        }

        let delivered = dispatcher.dispatch(&ada, &notice()).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(a.frames(), b.frames());
        assert!(closed.frames().is_empty());

        let frame: serde_json::Value = serde_json::from_str(&a.frames()[0]).unwrap();
        assert_eq!(frame["type"], "notification");
        assert_eq!(frame["payload"]["kind"], "test");
        assert!(frame["time"].is_string());
    }

    #[tokio::test]
    async fn other_users_are_untouched() {
        let (dispatcher, registry) = setup();
        let bob_channel = Arc::new(FakeChannel::default());
        let handle: ChannelHandle = bob_channel.clone();
        registry.register(UserId::from("bob"), handle).await;

        let delivered = dispatcher
            .dispatch(&UserId::from("ada"), &notice())
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        assert!(bob_channel.frames().is_empty());
    }
}
