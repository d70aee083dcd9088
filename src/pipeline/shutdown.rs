//! One-way stop signal shared by the scheduler loops and the result sweeper.

use tokio::sync::watch;

/// Sending half; flipping it stops every loop holding a [`ShutdownSignal`].
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Receiving half, cloned into each background task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the trigger fires or is dropped.
    pub async fn triggered(&mut self) {
        loop {
            let stop = *self.0.borrow_and_update();
            if stop {
                return;
            }
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_waiters() {
        let (trigger, signal) = channel();
        let mut waiter = signal.clone();
        let task = tokio::spawn(async move { waiter.triggered().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_finished());
        assert!(!signal.is_triggered());

        trigger.trigger();
        task.await.unwrap();
        assert!(signal.is_triggered());
        assert!(trigger.is_triggered());
    }

    #[tokio::test]
    async fn test_already_triggered_returns_immediately() {
        let (trigger, mut signal) = channel();
        trigger.trigger();
        tokio::time::timeout(Duration::from_millis(100), signal.triggered())
            .await
            .expect("should not wait");
    }

    #[tokio::test]
    async fn test_dropped_trigger_counts_as_stop() {
        let (trigger, mut signal) = channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_millis(100), signal.triggered())
            .await
            .expect("should not wait");
    }
}
