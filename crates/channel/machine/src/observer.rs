//! Outcome notifications for executor observers.

use std::collections::HashMap;

use channel_types::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::{Protocol, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationType {
    ProtocolCompleted,
    ProtocolFailed,
}

/// Outcome of one protocol run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationType,
    pub request_id: Uuid,
    pub protocol: Protocol,
    pub role: Option<Role>,
    /// Channels the run committed.
    pub channels: Vec<Address>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Subscribers per notification type.
///
/// Delivery never blocks: a full subscriber misses the notification, a
/// closed one is dropped.
#[derive(Debug)]
pub struct ObserverRegistry {
    subscribers: RwLock<HashMap<NotificationType, Vec<mpsc::Sender<Notification>>>>,
    capacity: usize,
}

impl ObserverRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn subscribe(&self, kind: NotificationType) -> mpsc::Receiver<Notification> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.subscribers
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(sender);
        debug!(kind = ?kind, "Observer subscribed");
        receiver
    }

    /// Deliver to every subscriber of `notification.kind`. Returns how many
    /// received it.
    pub async fn notify(&self, notification: &Notification) -> usize {
        let mut delivered = 0;
        let mut closed = false;
        {
            let subscribers = self.subscribers.read().await;
            for sender in subscribers.get(&notification.kind).into_iter().flatten() {
                match sender.try_send(notification.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            kind = ?notification.kind,
                            request_id = %notification.request_id,
                            "Observer channel full, dropping notification"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed = true,
                }
            }
        }

        if closed {
            let mut subscribers = self.subscribers.write().await;
            if let Some(list) = subscribers.get_mut(&notification.kind) {
                list.retain(|sender| !sender.is_closed());
            }
            debug!(kind = ?notification.kind, "Closed observers removed");
        }
        delivered
    }

    pub async fn subscriber_count(&self, kind: NotificationType) -> usize {
        self.subscribers
            .read()
            .await
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(kind: NotificationType) -> Notification {
        Notification {
            kind,
            request_id: Uuid::new_v4(),
            protocol: Protocol::Setup,
            role: Some(Role::Initiator),
            channels: vec![Address::new([7; 20])],
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_only_to_matching_kind() {
        let registry = ObserverRegistry::new(8);
        let mut completed = registry.subscribe(NotificationType::ProtocolCompleted).await;
        let mut failed = registry.subscribe(NotificationType::ProtocolFailed).await;

        let sent = notification(NotificationType::ProtocolCompleted);
        assert_eq!(registry.notify(&sent).await, 1);
        assert_eq!(completed.recv().await.unwrap(), sent);
        assert!(failed.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_subscriber_does_not_block() {
        let registry = ObserverRegistry::new(1);
        let _rx = registry.subscribe(NotificationType::ProtocolFailed).await;

        assert_eq!(registry.notify(&notification(NotificationType::ProtocolFailed)).await, 1);
        assert_eq!(registry.notify(&notification(NotificationType::ProtocolFailed)).await, 0);
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned() {
        let registry = ObserverRegistry::new(4);
        let rx = registry.subscribe(NotificationType::ProtocolCompleted).await;
        drop(rx);

        assert_eq!(
            registry.notify(&notification(NotificationType::ProtocolCompleted)).await,
            0
        );
        assert_eq!(
            registry.subscriber_count(NotificationType::ProtocolCompleted).await,
            0
        );
    }
}
