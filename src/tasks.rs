//! Upload and comment task records.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Credentials attached to an upload so the worker needs no config access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub sessdata: String,
    pub bili_jct: String,
}

/// One queued upload.
///
/// Tasks are not deduplicated: the early cut and the danmaku cut of the
/// same session are two distinct tasks.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub session_id: String,
    pub video_path: PathBuf,
    pub thumbnail_path: PathBuf,
    pub sc_path: PathBuf,
    pub he_path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub channel_id: u64,
    /// `true` for the danmaku-burned cut, `false` for the early cut.
    pub danmaku: bool,
    pub credentials: Credentials,
    /// Failed attempt count. The worker drops the task once this reaches
    /// the configured cap.
    pub trial: u32,
}

/// One comment to post under a published video.
///
/// Persisted in the save file while active so retries survive a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentTask {
    pub id: String,
    pub session_id: String,
    pub title: String,
    pub content: String,
    pub danmaku: bool,
}

impl CommentTask {
    /// Derive the follow-up comment for a queued upload.
    pub fn from_upload(task: &UploadTask) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: task.session_id.clone(),
            title: task.title.clone(),
            content: task.description.clone(),
            danmaku: task.danmaku,
        }
    }
}
