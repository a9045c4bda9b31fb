//! Publish manager: event dispatch and process wiring.
//!
//! Owns the session registry, the save store, both task queues and the
//! external collaborator handles. Lifecycle events flow in through
//! [`PublishManager::handle_event`], ended sessions get their own workflow
//! task, and the two worker loops drain the queues in the background. The
//! manager never surfaces errors to the event source; everything is logged.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::events::{EventType, RecorderEvent};
use crate::publisher::{Publisher, VideoGenerator};
use crate::queue::{TaskReceiver, TaskSender, task_queue};
use crate::save::SaveStore;
use crate::session::registry::SessionRegistry;
use crate::session::{SessionHandle, Video};
use crate::tasks::{CommentTask, UploadTask};
use crate::workers::{CommentWorker, UploadWorker};
use crate::workflow::UploadWorkflow;

/// Receiver halves held between construction and worker spawn.
struct WorkerInputs {
    uploads: TaskReceiver<UploadTask>,
    comments: TaskReceiver<CommentTask>,
}

/// Composition root of the publishing service.
pub struct PublishManager {
    config: Arc<AppConfig>,
    registry: Arc<SessionRegistry>,
    store: Arc<SaveStore>,
    upload_queue: TaskSender<UploadTask>,
    publisher: Arc<dyn Publisher>,
    workflow: Arc<UploadWorkflow>,
    worker_inputs: Mutex<Option<WorkerInputs>>,
    shutdown: CancellationToken,
}

impl PublishManager {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<SaveStore>,
        publisher: Arc<dyn Publisher>,
        generator: Arc<dyn VideoGenerator>,
    ) -> Self {
        let (upload_tx, uploads) = task_queue();
        let (comment_tx, comments) = task_queue();
        let registry = Arc::new(SessionRegistry::new(Duration::minutes(
            config.policy.continue_session_minutes as i64,
        )));
        let workflow = Arc::new(UploadWorkflow::new(
            config.clone(),
            generator,
            upload_tx.clone(),
            comment_tx,
        ));
        Self {
            config,
            registry,
            store,
            upload_queue: upload_tx,
            publisher,
            workflow,
            worker_inputs: Mutex::new(Some(WorkerInputs { uploads, comments })),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start the upload and comment worker loops. Call once.
    pub fn spawn_workers(&self) -> Vec<JoinHandle<()>> {
        let Some(inputs) = self.worker_inputs.lock().take() else {
            warn!("workers already spawned");
            return Vec::new();
        };
        let upload_worker = UploadWorker::new(
            inputs.uploads,
            self.upload_queue.clone(),
            self.publisher.clone(),
            self.store.clone(),
            self.config.policy.max_upload_trials,
            self.shutdown.clone(),
        );
        let comment_worker = CommentWorker::new(
            inputs.comments,
            self.publisher.clone(),
            self.store.clone(),
            StdDuration::from_secs(self.config.policy.comment_interval_secs),
            self.shutdown.clone(),
        );
        vec![
            tokio::spawn(upload_worker.run()),
            tokio::spawn(comment_worker.run()),
        ]
    }

    /// Dispatch one recorder lifecycle event.
    pub async fn handle_event(&self, event: RecorderEvent) {
        let now = event.event_timestamp.unwrap_or_else(Utc::now);
        let data = &event.event_data;

        if event.event_type == EventType::SessionStarted {
            self.registry.on_session_started(data, now);
            return;
        }

        let Some(handle) = self.registry.get(&data.session_id) else {
            warn!(
                room_id = data.room_id,
                session_id = %data.session_id,
                event_type = ?event.event_type,
                "event for unknown session dropped"
            );
            return;
        };

        handle.with_session_mut(|session| session.process_update(data));

        match event.event_type {
            EventType::FileClosed => {
                handle.with_session_mut(|session| session.add_video(Video::from_event(data)));
            }
            EventType::SessionEnded => {
                handle.with_session_mut(|session| session.end_at(now));
                info!(room_id = data.room_id, session_id = %data.session_id, "session ended");
                self.spawn_workflow(handle);
            }
            _ => {}
        }
    }

    /// Launch the upload workflow for an ended session as its own task.
    ///
    /// On completion the session is retired from the registry once the
    /// continuation window has passed and a restart can no longer merge
    /// into it.
    fn spawn_workflow(&self, handle: Arc<SessionHandle>) {
        let (token, generation) = handle.begin_workflow();
        let workflow = self.workflow.clone();
        let registry = self.registry.clone();
        let window = StdDuration::from_secs(self.config.policy.continue_session_minutes * 60);

        tokio::spawn(async move {
            let session_id = handle.with_session(|session| session.session_id.clone());
            match token.run_until_cancelled(workflow.run(&handle)).await {
                Some(Ok(())) => debug!(session_id = %session_id, "upload workflow finished"),
                Some(Err(e)) => {
                    warn!(session_id = %session_id, error = %e, "upload workflow aborted");
                }
                None => {
                    debug!(session_id = %session_id, "upload workflow cancelled");
                    return;
                }
            }
            handle.finish_workflow(generation);

            tokio::time::sleep(window).await;
            registry.evict_expired(Utc::now());
        });
    }

    /// Signal both worker loops to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<SaveStore> {
        &self.store
    }
}
