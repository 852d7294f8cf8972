use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle notifications from the streaming pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Transport connected and capture callback registered
    StreamStarted {
        session_id: String,
        timestamp: SystemTime,
    },
    /// Capture unregistered and transport torn down
    StreamStopped {
        session_id: Option<String>,
        timestamp: SystemTime,
    },
    /// The encoder can no longer produce output
    EncoderFailed { reason: String },
    /// Frames were discarded by the capture adapter while busy
    FramesDropped { count: u64 },
}

impl StreamEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            StreamEvent::StreamStarted { session_id, .. } => {
                format!("Stream started (session {})", session_id)
            }
            StreamEvent::StreamStopped { session_id, .. } => match session_id {
                Some(id) => format!("Stream stopped (session {})", id),
                None => "Stream stopped".to_string(),
            },
            StreamEvent::EncoderFailed { reason } => format!("Encoder failed: {}", reason),
            StreamEvent::FramesDropped { count } => format!("{} frames dropped", count),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::StreamStarted { .. } => "stream_started",
            StreamEvent::StreamStopped { .. } => "stream_stopped",
            StreamEvent::EncoderFailed { .. } => "encoder_failed",
            StreamEvent::FramesDropped { .. } => "frames_dropped",
        }
    }
}

/// Broadcast bus for pipeline notifications.
///
/// Publishing never blocks and never fails, so it is safe from camera and
/// encoder callbacks.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StreamEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter
    pub fn receiver(&self, filter: EventFilter, name: impl Into<String>) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.into())
    }

    /// Publish an event, returning how many subscribers will see it
    pub fn publish(&self, event: StreamEvent) -> usize {
        match &event {
            StreamEvent::StreamStarted { .. } | StreamEvent::StreamStopped { .. } => {
                info!("{}", event.description());
            }
            StreamEvent::EncoderFailed { reason } => {
                error!("Encoder failed: {}", reason);
            }
            StreamEvent::FramesDropped { .. } => {
                debug!("{}", event.description());
            }
        }

        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No subscribers for stream event");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    pub fn matches(&self, event: &StreamEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Filtered subscription that skips over lag instead of failing
pub struct EventReceiver {
    receiver: broadcast::Receiver<StreamEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<StreamEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Next matching event, or `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => {
                    debug!("Receiver '{}' received event: {}", self.name, event.description());
                    return Some(event);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let delivered = event_bus.publish(StreamEvent::FramesDropped { count: 3 });
        assert_eq!(delivered, 1);

        let received = receiver.recv().await.unwrap();
        assert_eq!(received, StreamEvent::FramesDropped { count: 3 });
    }

    #[test]
    fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(4);
        assert_eq!(
            event_bus.publish(StreamEvent::EncoderFailed {
                reason: "gone".to_string()
            }),
            0
        );
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut receiver =
            event_bus.receiver(EventFilter::EventTypes(vec!["encoder_failed"]), "test");

        event_bus.publish(StreamEvent::FramesDropped { count: 1 });
        event_bus.publish(StreamEvent::EncoderFailed {
            reason: "codec died".to_string(),
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type(), "encoder_failed");
        assert_eq!(event.description(), "Encoder failed: codec died");
    }

    #[tokio::test]
    async fn test_receiver_ends_when_bus_dropped() {
        let event_bus = EventBus::new(4);
        let mut receiver = event_bus.receiver(EventFilter::All, "test");
        drop(event_bus);

        assert!(receiver.recv().await.is_none());
    }
}
