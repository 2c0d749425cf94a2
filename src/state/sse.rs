use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Fan-out of node events to the connected game server plugins.
#[derive(Clone)]
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Hub buffering up to `capacity` events per slow stream.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// New stream receiving every later broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Number of open event streams.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish `event`; returns how many streams received it.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping() -> ServerEvent {
        ServerEvent {
            event: Some("ping".into()),
            data: "{}".into(),
        }
    }

    #[test]
    fn broadcast_without_streams_reaches_nobody() {
        let hub = SseHub::new(4);
        assert_eq!(hub.broadcast(ping()), 0);

        let _stream = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(hub.broadcast(ping()), 1);
    }
}
