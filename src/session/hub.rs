//! Per-user delivery channels
//!
//! Every open connection of a user is a member of that user's channel;
//! publishing to the user reaches all of them.

use super::OutboundFrame;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

type Members = HashMap<Uuid, mpsc::Sender<OutboundFrame>>;

#[derive(Clone, Default)]
pub struct DeliveryHub {
    channels: Arc<RwLock<HashMap<Uuid, Members>>>,
}

impl DeliveryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
        outbound: mpsc::Sender<OutboundFrame>,
    ) {
        let mut channels = self.channels.write().await;
        let members = channels.entry(user_id).or_default();
        members.insert(connection_id, outbound);
        info!(%user_id, %connection_id, members = members.len(), "Joined delivery channel");
    }

    pub async fn leave(&self, user_id: Uuid, connection_id: Uuid) {
        let mut channels = self.channels.write().await;
        if let Some(members) = channels.get_mut(&user_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                channels.remove(&user_id);
            }
        }
        info!(%user_id, %connection_id, "Left delivery channel");
    }

    /// Send `frame` to every connection of `user_id` without waiting on any
    /// of them. A connection whose queue is full or closed is removed, so a
    /// stalled tab never holds up a turn. Returns how many connections
    /// received the frame.
    pub async fn publish(&self, user_id: Uuid, frame: OutboundFrame) -> usize {
        let members: Vec<(Uuid, mpsc::Sender<OutboundFrame>)> = {
            let channels = self.channels.read().await;
            match channels.get(&user_id) {
                Some(members) => members
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut evicted = Vec::new();
        for (connection_id, tx) in members {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%user_id, %connection_id, "Connection is not keeping up; dropping it");
                    evicted.push(connection_id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%user_id, %connection_id, "Dropping closed connection");
                    evicted.push(connection_id);
                }
            }
        }

        for connection_id in evicted {
            self.leave(user_id, connection_id).await;
        }
        delivered
    }

    pub async fn member_count(&self, user_id: Uuid) -> usize {
        self.channels
            .read()
            .await
            .get(&user_id)
            .map_or(0, |members| members.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_only_that_user() {
        let hub = DeliveryHub::new();
        let (ann, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (tab_one, mut rx_one) = mpsc::channel(4);
        let (tab_two, mut rx_two) = mpsc::channel(4);
        let (bob_tx, mut bob_rx) = mpsc::channel(4);

        hub.join(ann, Uuid::new_v4(), tab_one).await;
        hub.join(ann, Uuid::new_v4(), tab_two).await;
        hub.join(bob, Uuid::new_v4(), bob_tx).await;

        let delivered = hub.publish(ann, OutboundFrame::chunk("hi", 1)).await;

        assert_eq!(delivered, 2);
        assert_eq!(rx_one.recv().await.unwrap().message, "hi");
        assert_eq!(rx_two.recv().await.unwrap().message_id, Some(1));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_member_is_dropped_without_blocking() {
        let hub = DeliveryHub::new();
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        let (stalled_tx, _stalled_rx) = mpsc::channel(1);
        hub.join(user, Uuid::new_v4(), tx).await;
        hub.join(user, Uuid::new_v4(), stalled_tx).await;

        assert_eq!(hub.publish(user, OutboundFrame::chunk("one", 1)).await, 2);
        assert_eq!(hub.publish(user, OutboundFrame::chunk("two", 1)).await, 1);
        assert_eq!(hub.member_count(user).await, 1);

        assert_eq!(rx.recv().await.unwrap().message, "one");
        assert_eq!(rx.recv().await.unwrap().message, "two");
    }

    #[tokio::test]
    async fn test_leave_and_closed_members() {
        let hub = DeliveryHub::new();
        let user = Uuid::new_v4();
        let (live, connection) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx, _rx) = mpsc::channel(4);
        let (dead_tx, dead_rx) = mpsc::channel(4);

        hub.join(user, live, tx).await;
        hub.join(user, connection, dead_tx).await;
        drop(dead_rx);

        assert_eq!(hub.publish(user, OutboundFrame::chunk("x", 1)).await, 1);
        assert_eq!(hub.member_count(user).await, 1);

        hub.leave(user, live).await;
        assert_eq!(hub.member_count(user).await, 0);
        assert_eq!(hub.publish(user, OutboundFrame::chunk("x", 2)).await, 0);
    }
}
