//! Bounded event channel and the single writer task that drains it into the
//! store.
//!
//! `tokio::sync::mpsc` applies backpressure on a full channel; this queue
//! instead drops the *oldest* buffered event so the most recent state always
//! wins, per the batching protocol's overflow policy.

use crate::event::NetworkEvent;
use crate::publisher::EventPublisher;
use crate::store::EventStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::{self, Duration};
use tracing::warn;

struct Inner {
    queue: Mutex<VecDeque<NetworkEvent>>,
    capacity: usize,
    notify: Notify,
    closed: std::sync::atomic::AtomicBool,
}

/// The bounded, drop-oldest-on-full queue shared between the Session
/// Manager (producer) and the writer task (consumer).
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<Inner>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        EventChannel {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                notify: Notify::new(),
                closed: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Never blocks. On a full queue the oldest buffered event is dropped
    /// and a WARN is logged.
    pub fn push(&self, event: NetworkEvent) {
        let mut queue = self.inner.queue.lock().unwrap();
        if queue.len() >= self.inner.capacity {
            queue.pop_front();
            warn!(capacity = self.inner.capacity, "event channel full, dropped oldest event");
        }
        queue.push_back(event);
        drop(queue);
        self.inner.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn drain_up_to(&self, n: usize) -> Vec<NetworkEvent> {
        let mut queue = self.inner.queue.lock().unwrap();
        let take = n.min(queue.len());
        queue.drain(..take).collect()
    }

    pub fn close(&self) {
        self.inner.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Drains `channel` into `store`, flushing whenever the queue reaches
/// `batch_size` or every `flush_interval`, whichever comes first. Exits
/// once the channel is closed and drained exactly once more.
pub async fn run_writer(
    channel: EventChannel,
    store: Arc<EventStore>,
    publisher: Arc<EventPublisher>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut ticker = time::interval(flush_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush(&channel, &store, &publisher, batch_size);
            }
            _ = channel.inner.notify.notified() => {
                if channel.len() >= batch_size {
                    flush(&channel, &store, &publisher, batch_size);
                }
            }
        }
        if channel.is_closed() && channel.is_empty() {
            break;
        }
        if channel.is_closed() {
            flush(&channel, &store, &publisher, usize::MAX);
            break;
        }
    }
}

fn flush(channel: &EventChannel, store: &EventStore, publisher: &EventPublisher, batch_size: usize) {
    let batch = channel.drain_up_to(batch_size);
    if batch.is_empty() {
        return;
    }
    if let Err(err) = store.append_batch(&batch) {
        warn!(%err, count = batch.len(), "batch flush failed");
        return;
    }
    for event in &batch {
        publisher.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;

    #[test]
    fn drops_oldest_when_full() {
        let channel = EventChannel::new(2);
        channel.push(NetworkEvent::new(EventType::TcpStart, "eth0", 4));
        let mut second = NetworkEvent::new(EventType::TcpStart, "eth0", 4);
        second.src_port = 2;
        channel.push(second);
        let mut third = NetworkEvent::new(EventType::TcpStart, "eth0", 4);
        third.src_port = 3;
        channel.push(third);

        let drained = channel.drain_up_to(10);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].src_port, 2);
        assert_eq!(drained[1].src_port, 3);
    }
}
