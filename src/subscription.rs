use crate::error::{BridgeError, Result};
use crate::types::StatusMessage;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Receiving end of one subscriber's snapshot feed
///
/// Dropping it is how a subscriber disconnects; the hub notices on its next
/// publish.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    pub(crate) fn new(id: Uuid, rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receive the next serialized snapshot
    pub async fn recv(&mut self) -> Result<String> {
        self.rx.recv().await.ok_or(BridgeError::BridgeClosed)
    }

    /// Receive and parse the next snapshot
    pub async fn recv_status(&mut self) -> Result<StatusMessage> {
        let json = self.recv().await?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Try to receive a snapshot without blocking
    ///
    /// Returns `None` if no message is available.
    pub fn try_recv(&mut self) -> Result<Option<String>> {
        match self.rx.try_recv() {
            Ok(json) => Ok(Some(json)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(BridgeError::BridgeClosed),
        }
    }
}
