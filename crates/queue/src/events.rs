//! Queue lifecycle events published on an in-process broadcast bus.

use serde::Serialize;
use throttleq_core::types::JobId;
use tokio::sync::broadcast;

/// Something that happened to a job or channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    Enqueued {
        channel: String,
        job_id: JobId,
    },
    Active {
        channel: String,
        job_id: JobId,
    },
    Completed {
        channel: String,
        job_id: JobId,
        result: serde_json::Value,
    },
    Retrying {
        channel: String,
        job_id: JobId,
        attempts_made: u32,
        delay_ms: u64,
        reason: String,
    },
    Failed {
        channel: String,
        job_id: JobId,
        attempts_made: u32,
        reason: String,
    },
    /// Returned to waiting without consuming an attempt.
    Released {
        channel: String,
        job_id: JobId,
    },
    /// Lease expired; returned to waiting.
    Stalled {
        channel: String,
        job_id: JobId,
    },
    /// Pause deadline for the channel, in milliseconds from the moment the
    /// request was merged.
    ChannelPaused {
        channel: String,
        pause_ms: u64,
    },
}

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out of [`QueueEvent`]s.
///
/// Slow subscribers observe `RecvError::Lagged` once the buffer fills.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped if nobody is listening.
    pub fn publish(&self, event: QueueEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(QueueEvent::Enqueued {
            channel: "c".into(),
            job_id: 1,
        });

        assert_eq!(rx1.recv().await.unwrap(), rx2.recv().await.unwrap());
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        EventBus::default().publish(QueueEvent::Stalled {
            channel: "c".into(),
            job_id: 1,
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(QueueEvent::ChannelPaused {
            channel: "c".into(),
            pause_ms: 3_000,
        })
        .unwrap();
        assert_eq!(json["type"], "channel_paused");
        assert_eq!(json["pause_ms"], 3_000);
    }
}
