use crate::subscription::Subscription;
use crate::types::SystemStatus;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Fans status snapshots out to every connected subscriber
#[derive(Default)]
pub struct BroadcastHub {
    subscribers: HashMap<Uuid, mpsc::UnboundedSender<String>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscribers currently registered
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Register a subscriber; it receives `current` straight away
    pub fn join(&mut self, current: &SystemStatus) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(json) = serialize(current) {
            let _ = tx.send(json);
        }
        self.subscribers.insert(id, tx);
        tracing::info!("Subscriber {} joined ({} connected)", id, self.subscribers.len());
        Subscription::new(id, rx)
    }

    /// Remove a subscriber whose transport closed cleanly
    pub fn leave(&mut self, id: Uuid) {
        if self.subscribers.remove(&id).is_some() {
            tracing::info!("Subscriber {} left ({} connected)", id, self.subscribers.len());
        }
    }

    /// Send `status` to every subscriber, dropping the ones that are gone
    ///
    /// Returns how many subscribers it was delivered to.
    pub fn publish(&mut self, status: &SystemStatus) -> usize {
        let Some(json) = serialize(status) else {
            return 0;
        };
        self.subscribers.retain(|id, tx| {
            let alive = tx.send(json.clone()).is_ok();
            if !alive {
                tracing::debug!("Pruning disconnected subscriber {}", id);
            }
            alive
        });
        self.subscribers.len()
    }
}

fn serialize(status: &SystemStatus) -> Option<String> {
    match serde_json::to_string(&status.to_message()) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("Failed to serialize status: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusMessage;

    #[tokio::test]
    async fn test_join_receives_current_snapshot() {
        let mut hub = BroadcastHub::new();
        let mut status = SystemStatus::default();
        status.on = true;
        status.zones[0].volume = 12;

        let mut sub = hub.join(&status);
        let msg = sub.recv_status().await.unwrap();
        assert!(msg.on);
        assert_eq!(msg.volume[0], 12);
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_prunes_dropped_subscribers() {
        let mut hub = BroadcastHub::new();
        let status = SystemStatus::default();

        let mut kept = hub.join(&status);
        let dropped = hub.join(&status);
        kept.recv().await.unwrap();
        drop(dropped);

        assert_eq!(hub.len(), 2);
        assert_eq!(hub.publish(&status), 1);
        assert_eq!(hub.len(), 1);

        let json = kept.recv().await.unwrap();
        let msg: StatusMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, status.to_message());
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let mut hub = BroadcastHub::new();
        let sub = hub.join(&SystemStatus::default());
        hub.leave(sub.id());
        hub.leave(sub.id());
        assert!(hub.is_empty());
        assert_eq!(hub.publish(&SystemStatus::default()), 0);
    }
}
