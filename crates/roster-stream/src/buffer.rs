//! Event sink — where produced batches go.
//!
//! The projection layer hands each transaction's events to a sink as one
//! atomic batch; the snapshot producer appends one event at a time. The
//! bounded [`EventBuffer`] is the in-process reference sink feeding a
//! downstream fan-out consumer.

use tokio::sync::mpsc;

use crate::error::{StreamError, StreamResult};
use crate::event::Event;

/// Destination for produced events.
///
/// A batch is delivered atomically: the downstream consumer sees all of
/// it or none of it.
pub trait EventSink {
    fn append(&self, batch: Vec<Event>) -> StreamResult<()>;
}

/// Bounded in-process event buffer.
///
/// Holds up to `capacity` undelivered batches; `append` blocks the
/// producer until the consumer drains — the backpressure snapshots rely
/// on. Call it from blocking context only (`spawn_blocking` inside a
/// runtime).
pub struct EventBuffer {
    tx: mpsc::Sender<Vec<Event>>,
}

impl EventBuffer {
    /// Create a buffer and the receiving half the fan-out consumer reads.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<Event>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for EventBuffer {
    fn append(&self, batch: Vec<Event>) -> StreamResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.tx
            .blocking_send(batch)
            .map_err(|_| StreamError::SinkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CatalogOp, Payload, ServiceHealthUpdate, Topic};
    use roster_state::{CheckServiceNode, Node, ServiceInstance};

    fn test_event(key: &str) -> Event {
        Event {
            topic: Topic::ServiceHealth,
            key: key.to_string(),
            index: 1,
            payload: Payload::ServiceHealth(ServiceHealthUpdate {
                op: CatalogOp::Register,
                check_service_node: CheckServiceNode {
                    node: Node::named("n1"),
                    service: ServiceInstance::default(),
                    checks: Vec::new(),
                },
            }),
        }
    }

    #[test]
    fn batches_arrive_in_append_order() {
        let (buffer, mut rx) = EventBuffer::channel(8);
        buffer.append(vec![test_event("a")]).unwrap();
        buffer.append(vec![test_event("b"), test_event("c")]).unwrap();

        assert_eq!(rx.blocking_recv().unwrap().len(), 1);
        let second = rx.blocking_recv().unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].key, "b");
    }

    #[test]
    fn empty_batches_are_dropped() {
        let (buffer, mut rx) = EventBuffer::channel(8);
        buffer.append(Vec::new()).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_consumer_surfaces_as_sink_error() {
        let (buffer, rx) = EventBuffer::channel(8);
        drop(rx);
        let err = buffer.append(vec![test_event("a")]).unwrap_err();
        assert!(matches!(err, StreamError::SinkClosed));
    }
}
