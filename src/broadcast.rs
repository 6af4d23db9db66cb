use tokio::sync::broadcast;
use tracing::trace;

use crate::error::BroadcastError;
use crate::events::Announcement;

const DEFAULT_CAPACITY: usize = 256;

/// Publish side of the announcement transport.
///
/// Delivery is best-effort and at-most-once: only currently connected
/// subscribers see a message, and nothing is retained for late joiners.
pub trait Broadcaster: Send + Sync {
    /// Returns how many subscribers the message was handed to. `Err` means the
    /// transport itself has stopped, not that nobody is listening.
    fn publish(&self, channel: &str, message: &str) -> Result<usize, BroadcastError>;
}

/// In-process fan-out over a tokio broadcast channel.
///
/// Subscribers that fall more than `capacity` messages behind lose the
/// oldest ones instead of holding up the publisher.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<Announcement>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Announcement> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Broadcaster for BroadcastHub {
    fn publish(&self, channel: &str, message: &str) -> Result<usize, BroadcastError> {
        // No receivers is the normal state between display connections.
        let reached = self
            .tx
            .send(Announcement::new(channel, message))
            .unwrap_or(0);
        trace!(channel, message, reached, "announcement published");
        Ok(reached)
    }
}
