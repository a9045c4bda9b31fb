//! Work queues feeding the upload and comment workers.
//!
//! Thin wrappers over an unbounded tokio channel. `push` never blocks (the
//! workflow must not stall behind a slow upload) and re-enqueueing a failed
//! task is just another push, which lands it at the tail so other pending
//! tasks are not starved behind a repeatedly failing one.

use tokio::sync::mpsc;

/// Create a connected sender/receiver pair.
pub fn task_queue<T>() -> (TaskSender<T>, TaskReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TaskSender { tx }, TaskReceiver { rx })
}

/// Producer half. Clonable; held by workflows and by the workers for
/// re-enqueueing.
#[derive(Debug)]
pub struct TaskSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for TaskSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> TaskSender<T> {
    /// Append a task at the tail. A send error means the worker is gone,
    /// which only happens during shutdown; the task is dropped then.
    pub fn push(&self, task: T) -> bool {
        self.tx.send(task).is_ok()
    }
}

/// Consumer half, owned by exactly one worker.
#[derive(Debug)]
pub struct TaskReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> TaskReceiver<T> {
    /// Wait for the next task. `None` once all senders are dropped.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take everything currently queued without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut drained = Vec::new();
        while let Ok(task) = self.rx.try_recv() {
            drained.push(task);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_then_recv_in_order() {
        let (tx, mut rx) = task_queue();
        assert!(tx.push(1));
        assert!(tx.push(2));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_drain_takes_all_pending() {
        let (tx, mut rx) = task_queue();
        tx.push("a");
        tx.push("b");
        assert_eq!(rx.drain(), vec!["a", "b"]);
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_recv_ends_when_senders_drop() {
        let (tx, mut rx) = task_queue::<u8>();
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
