//! Fixed-capacity FIFO queues connecting the pipeline stages.
//!
//! Thin wrapper over a bounded tokio mpsc channel: one consumer (a scheduler
//! loop), any number of producers. Capacity accounting comes from the channel
//! itself, so the depth reported here is exactly what `try_put` checks against.

use tokio::sync::mpsc::{self, error::TrySendError};

/// Why an item could not be enqueued. The item is handed back.
#[derive(Debug)]
pub enum PutError<T> {
    /// Queue at capacity (only from [`QueueSender::try_put`]).
    Full(T),
    /// The consuming loop has stopped.
    Closed(T),
}

impl<T> PutError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PutError::Full(item) | PutError::Closed(item) => item,
        }
    }
}

/// Creates a bounded FIFO queue.
///
/// # Panics
/// Panics if `capacity` is zero.
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (QueueSender { tx }, QueueReceiver { rx })
}

/// Producer side of a bounded queue.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueues without waiting. Returns the queue depth including the new item.
    pub fn try_put(&self, item: T) -> Result<usize, PutError<T>> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(self.len()),
            Err(TrySendError::Full(item)) => Err(PutError::Full(item)),
            Err(TrySendError::Closed(item)) => Err(PutError::Closed(item)),
        }
    }

    /// Enqueues, suspending while the queue is full.
    pub async fn put(&self, item: T) -> Result<(), PutError<T>> {
        self.tx
            .send(item)
            .await
            .map_err(|mpsc::error::SendError(item)| PutError::Closed(item))
    }

    /// Number of items currently waiting.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of a bounded queue.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> QueueReceiver<T> {
    /// Dequeues the oldest item, suspending while the queue is empty.
    ///
    /// Returns `None` once every sender is gone and the queue is drained.
    pub async fn get(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_try_put_reports_depth() {
        let (tx, _rx) = bounded::<u32>(3);
        assert!(tx.is_empty());
        assert_eq!(tx.try_put(1).unwrap(), 1);
        assert_eq!(tx.try_put(2).unwrap(), 2);
        assert_eq!(tx.len(), 2);
        assert_eq!(tx.capacity(), 3);
    }

    #[test]
    fn test_try_put_rejects_when_full() {
        let (tx, _rx) = bounded::<u32>(2);
        tx.try_put(1).unwrap();
        tx.try_put(2).unwrap();

        match tx.try_put(3) {
            Err(PutError::Full(item)) => assert_eq!(item, 3),
            other => panic!("Expected Full, got {:?}", other),
        }
        assert_eq!(tx.len(), 2);
    }

    #[test]
    fn test_try_put_after_receiver_dropped() {
        let (tx, rx) = bounded::<u32>(2);
        drop(rx);
        assert!(tx.is_closed());
        assert!(matches!(tx.try_put(7), Err(PutError::Closed(7))));
    }

    #[tokio::test]
    async fn test_get_is_fifo() {
        let (tx, mut rx) = bounded::<u32>(4);
        for i in 0..4 {
            tx.try_put(i).unwrap();
        }
        for i in 0..4 {
            assert_eq!(rx.get().await, Some(i));
        }
        assert!(tx.is_empty());
    }

    #[tokio::test]
    async fn test_get_frees_capacity() {
        let (tx, mut rx) = bounded::<u32>(1);
        tx.try_put(1).unwrap();
        assert!(matches!(tx.try_put(2), Err(PutError::Full(2))));

        assert_eq!(rx.get().await, Some(1));
        assert_eq!(tx.try_put(2).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_suspends_until_room() {
        let (tx, mut rx) = bounded::<u32>(1);
        tx.try_put(1).unwrap();

        let producer = {
            let tx = tx.clone();
            tokio::spawn(async move { tx.put(2).await.is_ok() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished(), "put should wait while full");

        assert_eq!(rx.get().await, Some(1));
        assert!(producer.await.unwrap());
        assert_eq!(rx.get().await, Some(2));
    }

    #[tokio::test]
    async fn test_get_returns_none_when_senders_gone() {
        let (tx, mut rx) = bounded::<u32>(1);
        drop(tx);
        assert_eq!(rx.get().await, None);
    }
}
