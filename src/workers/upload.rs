//! Upload worker loop.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::publisher::Publisher;
use crate::queue::{TaskReceiver, TaskSender};
use crate::save::SaveStore;
use crate::tasks::UploadTask;

/// Single consumer of the upload queue.
///
/// Pulls one task at a time and invokes the publisher. A successful upload
/// records the published id in the save store immediately. A failure
/// re-enqueues the task at the tail until its trial counter reaches the
/// configured cap, after which the task is dropped with a terminal-failure
/// log: the upload is lost and an operator has to act on it.
pub struct UploadWorker {
    queue: TaskReceiver<UploadTask>,
    /// Sender side of the same queue, used to requeue failed tasks.
    requeue: TaskSender<UploadTask>,
    publisher: Arc<dyn Publisher>,
    store: Arc<SaveStore>,
    max_trials: u32,
    shutdown: CancellationToken,
}

impl UploadWorker {
    pub fn new(
        queue: TaskReceiver<UploadTask>,
        requeue: TaskSender<UploadTask>,
        publisher: Arc<dyn Publisher>,
        store: Arc<SaveStore>,
        max_trials: u32,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            requeue,
            publisher,
            store,
            max_trials,
            shutdown,
        }
    }

    /// Run until shutdown.
    pub async fn run(mut self) {
        info!("upload worker started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                task = self.queue.recv() => {
                    let Some(task) = task else { break };
                    self.process(task).await;
                }
            }
        }
        info!("upload worker stopped");
    }

    async fn process(&self, mut task: UploadTask) {
        // Live snapshot: the map may have changed since the task was queued.
        let session_id_map = self.store.session_id_map().await;
        match self.publisher.upload(&task, &session_id_map).await {
            Ok(published_id) => {
                info!(
                    session_id = %task.session_id,
                    published_id = %published_id,
                    title = %task.title,
                    danmaku = task.danmaku,
                    "upload complete"
                );
                if let Err(e) = self
                    .store
                    .record_published(&task.session_id, &published_id)
                    .await
                {
                    error!(
                        session_id = %task.session_id,
                        error = %e,
                        "failed to persist published id"
                    );
                }
            }
            Err(e) => {
                if task.trial < self.max_trials {
                    task.trial += 1;
                    warn!(
                        title = %task.title,
                        trial = task.trial,
                        error = %e,
                        "upload failed, retrying"
                    );
                    self.requeue.push(task);
                } else {
                    error!(
                        title = %task.title,
                        trials = task.trial,
                        error = %e,
                        "upload failed too many times, dropping task"
                    );
                }
            }
        }
    }
}
