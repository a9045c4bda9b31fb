//! Comment worker loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::publisher::Publisher;
use crate::queue::TaskReceiver;
use crate::save::SaveStore;
use crate::tasks::CommentTask;

/// Periodic consumer of the comment queue.
///
/// Each cycle drains freshly queued tasks into the persisted active list,
/// attempts to post every active task, and removes exactly the ones that
/// succeeded. A task whose session has no published id yet just fails its
/// attempt and is retried next cycle. There is no retry cap: a permanently
/// failing task stays active until an operator resolves it.
pub struct CommentWorker {
    queue: TaskReceiver<CommentTask>,
    publisher: Arc<dyn Publisher>,
    store: Arc<SaveStore>,
    period: Duration,
    shutdown: CancellationToken,
}

impl CommentWorker {
    pub fn new(
        queue: TaskReceiver<CommentTask>,
        publisher: Arc<dyn Publisher>,
        store: Arc<SaveStore>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            publisher,
            store,
            period,
            shutdown,
        }
    }

    /// Run until shutdown, one cycle per period.
    pub async fn run(mut self) {
        info!("comment worker started");
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.cycle().await,
            }
        }
        info!("comment worker stopped");
    }

    async fn cycle(&mut self) {
        // Newly queued tasks become durable before the first attempt.
        let drained = self.queue.drain();
        if let Err(e) = self.store.activate_comment_tasks(drained).await {
            error!(error = %e, "failed to persist new comment tasks");
        }

        let active = self.store.active_comment_tasks().await;
        if active.is_empty() {
            return;
        }
        let session_id_map = self.store.session_id_map().await;

        let mut posted = Vec::new();
        for task in &active {
            match self.publisher.post_comment(task, &session_id_map).await {
                Ok(true) => {
                    info!(session_id = %task.session_id, title = %task.title, "comment posted");
                    posted.push(task.id.clone());
                }
                Ok(false) => {
                    debug!(session_id = %task.session_id, "comment not posted, will retry");
                }
                Err(e) => {
                    warn!(session_id = %task.session_id, error = %e, "comment post failed");
                }
            }
        }

        if let Err(e) = self.store.remove_comment_tasks(&posted).await {
            error!(error = %e, "failed to persist posted comment removal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::queue::{TaskSender, task_queue};
    use crate::tasks::UploadTask;
    use crate::{Error, Result};

    /// Posts successfully only for sessions with a published id; counts
    /// attempts per comment id.
    struct MapGatedPublisher {
        attempts: Mutex<HashMap<String, u32>>,
        fail_with_error: bool,
    }

    #[async_trait]
    impl Publisher for MapGatedPublisher {
        async fn upload(
            &self,
            _task: &UploadTask,
            _session_id_map: &HashMap<String, String>,
        ) -> Result<String> {
            unreachable!("comment worker never uploads")
        }

        async fn post_comment(
            &self,
            task: &CommentTask,
            session_id_map: &HashMap<String, String>,
        ) -> Result<bool> {
            *self
                .attempts
                .lock()
                .unwrap()
                .entry(task.id.clone())
                .or_default() += 1;
            if self.fail_with_error {
                return Err(Error::Comment("simulated failure".to_string()));
            }
            Ok(session_id_map.contains_key(&task.session_id))
        }
    }

    fn comment(id: &str, session_id: &str) -> CommentTask {
        CommentTask {
            id: id.to_string(),
            session_id: session_id.to_string(),
            title: "title".to_string(),
            content: "content".to_string(),
            danmaku: false,
        }
    }

    struct Harness {
        worker: CommentWorker,
        queue: TaskSender<CommentTask>,
        publisher: Arc<MapGatedPublisher>,
        store: Arc<SaveStore>,
        _dir: tempfile::TempDir,
    }

    fn harness(fail_with_error: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SaveStore::load(dir.path().join("save.json")).unwrap());
        let publisher = Arc::new(MapGatedPublisher {
            attempts: Mutex::new(HashMap::new()),
            fail_with_error,
        });
        let (tx, rx) = task_queue();
        let worker = CommentWorker::new(
            rx,
            publisher.clone(),
            store.clone(),
            Duration::from_secs(60),
            CancellationToken::new(),
        );
        Harness {
            worker,
            queue: tx,
            publisher,
            store,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_drained_task_is_persisted_before_success() {
        let mut h = harness(false);
        h.queue.push(comment("c-1", "s-1"));

        // s-1 has no published id yet: the task stays active.
        h.worker.cycle().await;
        assert_eq!(h.store.active_comment_tasks().await.len(), 1);
        assert_eq!(h.publisher.attempts.lock().unwrap()["c-1"], 1);
    }

    #[tokio::test]
    async fn test_task_removed_on_first_success() {
        let mut h = harness(false);
        h.queue.push(comment("c-1", "s-1"));

        h.worker.cycle().await;
        h.worker.cycle().await;
        assert_eq!(h.publisher.attempts.lock().unwrap()["c-1"], 2);

        h.store.record_published("s-1", "BV1xx").await.unwrap();
        h.worker.cycle().await;
        assert!(h.store.active_comment_tasks().await.is_empty());
        assert_eq!(h.publisher.attempts.lock().unwrap()["c-1"], 3);

        // Gone for good: the next cycle does not attempt it again.
        h.worker.cycle().await;
        assert_eq!(h.publisher.attempts.lock().unwrap()["c-1"], 3);
    }

    #[tokio::test]
    async fn test_errors_are_not_fatal_and_task_survives() {
        let mut h = harness(true);
        h.queue.push(comment("c-1", "s-1"));
        h.store.record_published("s-1", "BV1xx").await.unwrap();

        for _ in 0..5 {
            h.worker.cycle().await;
        }
        // Unbounded retries: still active after any number of failures.
        assert_eq!(h.store.active_comment_tasks().await.len(), 1);
        assert_eq!(h.publisher.attempts.lock().unwrap()["c-1"], 5);
    }

    #[tokio::test]
    async fn test_only_successful_tasks_removed() {
        let mut h = harness(false);
        h.queue.push(comment("c-1", "s-1"));
        h.queue.push(comment("c-2", "s-2"));
        h.store.record_published("s-2", "BV2xx").await.unwrap();

        h.worker.cycle().await;
        let remaining = h.store.active_comment_tasks().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "c-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cycles_on_the_period() {
        let mut h = harness(false);
        h.queue.push(comment("c-1", "s-1"));
        let shutdown = CancellationToken::new();
        h.worker.shutdown = shutdown.clone();

        let publisher = h.publisher.clone();
        let join = tokio::spawn(h.worker.run());

        // First cycle fires immediately, then once per period.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(publisher.attempts.lock().unwrap()["c-1"], 2);

        shutdown.cancel();
        join.await.unwrap();
    }
}
