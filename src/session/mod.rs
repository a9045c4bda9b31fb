//! Recording session entities.
//!
//! A [`Session`] accumulates everything the recorder reports about one
//! continuous live stream: identity, timing, metadata and the closed
//! recording files. Sessions are shared behind a [`SessionHandle`], which
//! adds the workflow slot used for cancellation when a room resumes
//! recording shortly after ending.

pub mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::events::EventData;

/// One closed recording file belonging to a session. Immutable once added.
#[derive(Debug, Clone)]
pub struct Video {
    pub path: PathBuf,
    pub open_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
}

impl Video {
    /// Build a video record from a `FileClosed` event payload.
    pub fn from_event(data: &EventData) -> Self {
        Self {
            path: PathBuf::from(data.relative_path.clone().unwrap_or_default()),
            open_time: data.file_open_time,
            close_time: data.file_close_time,
        }
    }
}

/// Sibling artifact paths derived from the first recorded file.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub thumbnail: PathBuf,
    pub sc_file: PathBuf,
    pub he_file: PathBuf,
}

/// State of one recording session.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub room_id: u64,
    pub room_name: String,
    pub room_title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub videos: Vec<Video>,
    /// Path of the early (no-danmaku) cut once generated.
    pub early_video_path: Option<PathBuf>,
}

impl Session {
    /// Create a session from a `SessionStarted` event payload.
    pub fn new(data: &EventData, start_time: DateTime<Utc>) -> Self {
        Self {
            session_id: data.session_id.clone(),
            room_id: data.room_id,
            room_name: data.name.clone().unwrap_or_default(),
            room_title: data.title.clone().unwrap_or_default(),
            start_time,
            end_time: None,
            videos: Vec::new(),
            early_video_path: None,
        }
    }

    /// Apply the generic fields any event may carry.
    pub fn process_update(&mut self, data: &EventData) {
        if let Some(name) = &data.name {
            self.room_name = name.clone();
        }
        if let Some(title) = &data.title {
            self.room_title = title.clone();
        }
    }

    /// Append a recording file. The sequence is append-only.
    pub fn add_video(&mut self, video: Video) {
        self.videos.push(video);
    }

    /// Mark the session as ended.
    pub fn end_at(&mut self, time: DateTime<Utc>) {
        self.end_time = Some(time);
    }

    /// Derive the thumbnail / superchat / highlight paths next to the first
    /// recorded file. `None` before any file has closed.
    pub fn output_paths(&self) -> Option<OutputPaths> {
        let first = self.videos.first()?;
        Some(OutputPaths {
            thumbnail: first.path.with_extension("jpg"),
            sc_file: first.path.with_extension("sc.txt"),
            he_file: first.path.with_extension("he.txt"),
        })
    }
}

/// Workflow slot states. The generation counter lets a finishing workflow
/// detect that it was superseded after a continuation merge.
#[derive(Debug)]
enum WorkflowSlot {
    Idle,
    Running { token: CancellationToken, generation: u64 },
    Finished,
}

/// Shared handle to a session plus its upload workflow slot.
///
/// Multiple registry keys may point at the same handle after a continuation
/// merge; the session state itself stays single-instance.
#[derive(Debug)]
pub struct SessionHandle {
    session: RwLock<Session>,
    workflow: Mutex<WorkflowSlot>,
    generations: Mutex<u64>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Arc<Self> {
        Arc::new(Self {
            session: RwLock::new(session),
            workflow: Mutex::new(WorkflowSlot::Idle),
            generations: Mutex::new(0),
        })
    }

    /// Run a closure against the session state under the read lock.
    pub fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&self.session.read())
    }

    /// Run a closure against the session state under the write lock.
    pub fn with_session_mut<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.session.write())
    }

    /// Clone the current session state.
    pub fn snapshot(&self) -> Session {
        self.session.read().clone()
    }

    /// Claim the workflow slot for a new run.
    ///
    /// Any previous run is cancelled; the returned generation must be passed
    /// back to [`SessionHandle::finish_workflow`].
    pub fn begin_workflow(&self) -> (CancellationToken, u64) {
        let mut counter = self.generations.lock();
        *counter += 1;
        let generation = *counter;
        let token = CancellationToken::new();
        let prev = std::mem::replace(
            &mut *self.workflow.lock(),
            WorkflowSlot::Running {
                token: token.clone(),
                generation,
            },
        );
        if let WorkflowSlot::Running { token, .. } = prev {
            token.cancel();
        }
        (token, generation)
    }

    /// Mark the workflow as finished, unless it was superseded meanwhile.
    pub fn finish_workflow(&self, generation: u64) {
        let mut slot = self.workflow.lock();
        if matches!(*slot, WorkflowSlot::Running { generation: g, .. } if g == generation) {
            *slot = WorkflowSlot::Finished;
        }
    }

    /// Reset the workflow slot to idle, cancelling any in-flight run.
    /// Returns whether a run was cancelled.
    ///
    /// Called on a continuation merge. The reset is unconditional: even a
    /// workflow that already finished (a fast abort on a config error or a
    /// no-uploader room) must leave the finished state behind, because a
    /// merged-back session is live again and must not be evicted until its
    /// next workflow finishes.
    pub fn cancel_workflow(&self) -> bool {
        let mut slot = self.workflow.lock();
        match std::mem::replace(&mut *slot, WorkflowSlot::Idle) {
            WorkflowSlot::Running { token, .. } => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Whether the last workflow ran to completion (or error) without being
    /// superseded.
    pub fn workflow_finished(&self) -> bool {
        matches!(*self.workflow.lock(), WorkflowSlot::Finished)
    }
}
