use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use bloodlink_types::events::GatewayEvent;

/// Manages all connected clients and routes events to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Board-wide events (request created / answered) go to every client
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted send channels: user_id -> (conn_id -> channel).
    /// A user may have several tabs open.
    user_channels: RwLock<HashMap<Uuid, HashMap<Uuid, UserChannel>>>,
}

struct UserChannel {
    /// Session (`jti`) the connection identified with.
    session_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to board-wide events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-connection targeted channel. Returns (conn_id, receiver).
    /// The receiver yields `None` once the session is disconnected.
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, UserChannel { session_id, tx });
        (conn_id, rx)
    }

    /// Drop every connection that identified with `session_id`. Returns how
    /// many were dropped.
    pub async fn disconnect_session(&self, session_id: Uuid) -> usize {
        let mut channels = self.inner.user_channels.write().await;
        let mut dropped = 0;
        channels.retain(|_, conns| {
            let before = conns.len();
            conns.retain(|_, channel| channel.session_id != session_id);
            dropped += before - conns.len();
            !conns.is_empty()
        });
        dropped
    }

    /// Drop one connection's channel; the user entry goes once it is empty.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to every connection of a user.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some(conns) = channels.get(&user_id) {
            for channel in conns.values() {
                let _ = channel.tx.send(event.clone());
            }
        }
    }

    /// Number of live connections for a user.
    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .user_channels
            .read()
            .await
            .get(&user_id)
            .map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloodlink_types::models::RequestStatus;

    fn status_event(id: Uuid) -> GatewayEvent {
        GatewayEvent::RequestStatusUpdate {
            request_id: id,
            status: RequestStatus::Declined,
            responded_by: id,
        }
    }

    #[tokio::test]
    async fn targeted_events_reach_every_connection_of_the_user() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let bystander = Uuid::new_v4();

        let (_c1, mut rx1) = dispatcher.register_user_channel(user, Uuid::new_v4()).await;
        let (_c2, mut rx2) = dispatcher.register_user_channel(user, Uuid::new_v4()).await;
        let (_c3, mut rx3) = dispatcher.register_user_channel(bystander, Uuid::new_v4()).await;
        assert_eq!(dispatcher.connection_count(user).await, 2);

        dispatcher.send_to_user(user, status_event(user)).await;

        assert!(matches!(rx1.try_recv(), Ok(GatewayEvent::RequestStatusUpdate { .. })));
        assert!(matches!(rx2.try_recv(), Ok(GatewayEvent::RequestStatusUpdate { .. })));
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_only_drops_that_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (c1, _rx1) = dispatcher.register_user_channel(user, Uuid::new_v4()).await;
        let (c2, mut rx2) = dispatcher.register_user_channel(user, Uuid::new_v4()).await;

        dispatcher.unregister_user_channel(user, c1).await;
        assert_eq!(dispatcher.connection_count(user).await, 1);

        dispatcher.send_to_user(user, status_event(user)).await;
        assert!(rx2.try_recv().is_ok());

        dispatcher.unregister_user_channel(user, c2).await;
        assert_eq!(dispatcher.connection_count(user).await, 0);
    }

    #[tokio::test]
    async fn disconnect_session_closes_only_that_sessions_channels() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (laptop, phone) = (Uuid::new_v4(), Uuid::new_v4());
        let (_c1, mut tab1) = dispatcher.register_user_channel(user, laptop).await;
        let (_c2, mut tab2) = dispatcher.register_user_channel(user, laptop).await;
        let (_c3, mut other) = dispatcher.register_user_channel(user, phone).await;

        assert_eq!(dispatcher.disconnect_session(laptop).await, 2);
        assert_eq!(dispatcher.connection_count(user).await, 1);

        dispatcher.send_to_user(user, status_event(user)).await;
        assert!(tab1.recv().await.is_none());
        assert!(tab2.recv().await.is_none());
        assert!(other.try_recv().is_ok());

        assert_eq!(dispatcher.disconnect_session(phone).await, 1);
        assert_eq!(dispatcher.connection_count(user).await, 0);
        assert_eq!(dispatcher.disconnect_session(phone).await, 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let id = Uuid::new_v4();
        dispatcher.broadcast(status_event(id));

        match rx.recv().await.unwrap() {
            GatewayEvent::RequestStatusUpdate { request_id, .. } => assert_eq!(request_id, id),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
