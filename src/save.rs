//! Durable publishing state.
//!
//! The save file is the source of truth for which sessions already have a
//! published video and which comment tasks are still outstanding. Every
//! mutation persists synchronously under a single lock, so a crash never
//! loses a completed upload's record or an accepted comment task. Writes go
//! through a temp file plus rename so a crash mid-write cannot corrupt the
//! previously-good state either.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::Result;
use crate::tasks::CommentTask;

/// Persisted publishing state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    /// session id → published video id. Lets comment tasks (and uploads
    /// that chain onto a sibling session) find the target video.
    #[serde(default)]
    pub session_id_map: HashMap<String, String>,
    /// Comment tasks not yet successfully posted.
    #[serde(default)]
    pub active_comment_tasks: Vec<CommentTask>,
}

/// Owner of the [`SaveState`] and its file.
///
/// All access goes through this store's lock; the accessors returning
/// clones are the only legal way for workers to read the state.
pub struct SaveStore {
    path: PathBuf,
    state: Mutex<SaveState>,
}

impl SaveStore {
    /// Load the save file, creating an empty one if it does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            info!(path = %path.display(), "no save file, creating empty state");
            let state = SaveState::default();
            write_state(&path, &state)?;
            state
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Current session id → published id mapping.
    ///
    /// This is a point-in-time clone; callers must tolerate the live map
    /// changing between reads.
    pub async fn session_id_map(&self) -> HashMap<String, String> {
        self.state.lock().await.session_id_map.clone()
    }

    /// Current outstanding comment tasks.
    pub async fn active_comment_tasks(&self) -> Vec<CommentTask> {
        self.state.lock().await.active_comment_tasks.clone()
    }

    /// Record a completed upload and persist immediately.
    pub async fn record_published(&self, session_id: &str, published_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .session_id_map
            .insert(session_id.to_string(), published_id.to_string());
        write_state(&self.path, &state)?;
        debug!(session_id, published_id, "published id recorded");
        Ok(())
    }

    /// Move newly queued comment tasks into the active list and persist.
    pub async fn activate_comment_tasks(&self, tasks: Vec<CommentTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        state.active_comment_tasks.extend(tasks);
        write_state(&self.path, &state)
    }

    /// Drop the comment tasks that posted successfully. Persists only when
    /// something was actually removed.
    pub async fn remove_comment_tasks(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        let before = state.active_comment_tasks.len();
        state
            .active_comment_tasks
            .retain(|task| !ids.contains(&task.id));
        if state.active_comment_tasks.len() != before {
            write_state(&self.path, &state)?;
        }
        Ok(())
    }
}

/// Serialize the state and swap it into place atomically.
fn write_state(path: &Path, state: &SaveState) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    tmp.write_all(&serde_json::to_vec_pretty(state)?)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
