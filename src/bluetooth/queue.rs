// Bounded FIFO of discovered peripherals

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use super::DiscoveredPeripheral;

/// Producers never wait: when the queue is full the newest discovery is
/// dropped and counted. The drain loop is the single consumer.
pub fn peripheral_queue<P>(capacity: usize) -> (QueueProducer<P>, PeripheralQueue<P>) {
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        QueueProducer {
            tx,
            dropped: dropped.clone(),
        },
        PeripheralQueue { rx, dropped },
    )
}

pub struct QueueProducer<P> {
    tx: mpsc::Sender<DiscoveredPeripheral<P>>,
    dropped: Arc<AtomicU64>,
}

impl<P> Clone for QueueProducer<P> {
    fn clone(&self) -> Self {
        QueueProducer {
            tx: self.tx.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

impl<P> QueueProducer<P> {
    /// Enqueue without blocking. Returns `false` if the discovery was dropped.
    pub fn offer(&self, discovered: DiscoveredPeripheral<P>) -> bool {
        match self.tx.try_send(discovered) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

pub struct PeripheralQueue<P> {
    rx: mpsc::Receiver<DiscoveredPeripheral<P>>,
    dropped: Arc<AtomicU64>,
}

impl<P> PeripheralQueue<P> {
    pub fn try_pop(&mut self) -> Option<DiscoveredPeripheral<P>> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Discoveries dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_discovery_order() {
        let (producer, mut queue) = peripheral_queue(8);
        for id in ["a", "b", "c"] {
            assert!(producer.offer(DiscoveredPeripheral::new(id, None)));
        }
        assert_eq!(queue.len(), 3);
        let order: Vec<_> = std::iter::from_fn(|| queue.try_pop())
            .map(|d| d.peripheral)
            .collect();
        assert_eq!(order, ["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_drops_newest() {
        let (producer, mut queue) = peripheral_queue(2);
        assert!(producer.offer(DiscoveredPeripheral::new(1, None)));
        assert!(producer.offer(DiscoveredPeripheral::new(2, None)));
        assert!(!producer.offer(DiscoveredPeripheral::new(3, None)));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.try_pop().map(|d| d.peripheral), Some(1));
        assert_eq!(queue.try_pop().map(|d| d.peripheral), Some(2));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn duplicates_are_kept() {
        let (producer, queue) = peripheral_queue(4);
        producer.offer(DiscoveredPeripheral::new("same", Some(-40)));
        producer.offer(DiscoveredPeripheral::new("same", Some(-42)));
        assert_eq!(queue.len(), 2);
    }
}
