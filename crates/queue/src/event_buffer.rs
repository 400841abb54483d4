//! `EventBuffer` — bounded, drop-oldest buffer feeding the scheduler's event
//! subsystem. No back-pressure is provided to the publisher: a full buffer
//! drops its oldest entry and counts the drop, rather than blocking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

pub struct EventBuffer<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl<T> EventBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Publish an item. If the buffer is at capacity, the oldest item is
    /// dropped to make room and the drop counter is incremented. Returns
    /// `true` if a drop occurred, so callers can surface it to metrics.
    pub fn publish(&self, item: T) -> bool {
        let dropped = {
            let mut items = self.items.lock();
            let dropped = items.len() >= self.capacity;
            if dropped {
                items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            items.push_back(item);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    /// Wait for and remove the oldest item.
    pub async fn recv(&self) -> T {
        loop {
            if let Some(item) = self.items.lock().pop_front() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    /// Total number of items dropped for capacity since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_recv_round_trips() {
        let buf: EventBuffer<u32> = EventBuffer::new(4);
        buf.publish(1);
        buf.publish(2);
        assert_eq!(buf.recv().await, 1);
        assert_eq!(buf.recv().await, 2);
    }

    #[tokio::test]
    async fn full_buffer_drops_oldest_and_counts_it() {
        let buf: EventBuffer<u32> = EventBuffer::new(2);
        buf.publish(1);
        buf.publish(2);
        buf.publish(3); // drops 1
        assert_eq!(buf.dropped_count(), 1);
        assert_eq!(buf.recv().await, 2);
        assert_eq!(buf.recv().await, 3);
    }

    #[tokio::test]
    async fn recv_waits_for_publish() {
        use std::sync::Arc;
        let buf = Arc::new(EventBuffer::<u32>::new(4));
        let buf2 = buf.clone();
        let waiter = tokio::spawn(async move { buf2.recv().await });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        buf.publish(42);
        assert_eq!(waiter.await.unwrap(), 42);
    }
}
