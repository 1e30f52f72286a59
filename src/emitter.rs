//! In-process fan-out of emitted session snapshots.
//!
//! Subscribers receive snapshots over unbounded channels; publishing never
//! blocks event processing. A subscriber that drops its receiver is pruned
//! on the next publish.

use crate::session::SessionSnapshot;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Publish/subscribe bus for session snapshots.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Sender<SessionSnapshot>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&mut self) -> Receiver<SessionSnapshot> {
        let (sender, receiver) = unbounded();
        self.subscribers.push(sender);
        receiver
    }

    /// Deliver a snapshot to every live subscriber.
    pub fn publish(&mut self, snapshot: &SessionSnapshot) {
        self.subscribers
            .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str) -> SessionSnapshot {
        SessionSnapshot {
            session_id: id.to_string(),
            instance_id: "widget".to_string(),
            nearest: Vec::new(),
            timestamp: 1000,
        }
    }

    #[test]
    fn test_fanout_to_all_subscribers() {
        let mut bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(&snapshot("s1"));

        assert_eq!(first.recv().unwrap().session_id, "s1");
        assert_eq!(second.recv().unwrap().session_id, "s1");
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(&snapshot("s1"));

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.recv().unwrap().session_id, "s1");
    }
}
