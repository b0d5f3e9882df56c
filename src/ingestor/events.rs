use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Notifications raised by guide refreshes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpgEvent {
    /// A provider's snapshot was replaced; cached lookups for the old one are stale
    SnapshotReplaced { provider_id: String, snapshot_id: Uuid },
    /// Human-readable status for the user, e.g. merge summary counts
    Notification {
        provider_id: Option<String>,
        message: String,
    },
}

pub type EventSender = broadcast::Sender<EpgEvent>;
pub type EventReceiver = broadcast::Receiver<EpgEvent>;

/// Broadcast channel owned by whoever orchestrates refreshes.
///
/// Subscribers obtain receivers explicitly; publishing with no subscribers
/// is not an error.
#[derive(Clone)]
pub struct EpgEventBus {
    tx: EventSender,
}

impl Default for EpgEventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

impl EpgEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.tx.subscribe()
    }

    /// Send an event, returning how many subscribers received it
    pub fn publish(&self, event: EpgEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!("No subscribers for event: {:?}", event);
                0
            }
        }
    }

    pub fn notify(&self, provider_id: Option<&str>, message: impl Into<String>) -> usize {
        self.publish(EpgEvent::Notification {
            provider_id: provider_id.map(str::to_string),
            message: message.into(),
        })
    }
}
