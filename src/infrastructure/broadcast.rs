use crate::domain::ports::{NotificationSink, UiEvent};
use tokio::sync::broadcast;
use tracing::trace;

/// Fans UI events out to every subscribed operator screen.
///
/// Publishing never blocks. Subscribers that fall behind skip the oldest events.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<UiEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationSink for BroadcastNotifier {
    fn publish(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            trace!("No UI subscribers for event");
        }
    }
}
