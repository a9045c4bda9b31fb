//! External collaborator seams: publishing and video generation.
//!
//! The core never talks to the publishing platform or to the transcoding
//! toolchain directly; it goes through these traits. The shipped
//! implementations are deliberately thin: [`HttpPublisher`] delegates to a
//! companion upload service over HTTP, [`CommandVideoGenerator`] shells out
//! to configured external commands.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::session::Session;
use crate::tasks::{CommentTask, UploadTask};
use crate::{Error, Result};

/// Performs the actual upload and comment-post network calls.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload the task's video. Returns the published video id.
    ///
    /// `session_id_map` is the live mapping at the time of the attempt;
    /// some uploads reference a sibling session's published video.
    async fn upload(
        &self,
        task: &UploadTask,
        session_id_map: &HashMap<String, String>,
    ) -> Result<String>;

    /// Post the comment under the task's published video.
    ///
    /// `Ok(false)` means "not posted, try again next cycle" (including the
    /// case where the session has no published id yet); `Err` is an
    /// unexpected failure, logged and retried all the same.
    async fn post_comment(
        &self,
        task: &CommentTask,
        session_id_map: &HashMap<String, String>,
    ) -> Result<bool>;
}

/// Produces the uploadable cuts of a recorded session.
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Generate the early (no-danmaku) cut. `Ok(None)` means no early
    /// video is needed for this session. May suspend for a long time.
    async fn early_cut(&self, session: &Session) -> Result<Option<PathBuf>>;

    /// Generate the danmaku-burned cut. Always produces a video.
    async fn danmaku_cut(&self, session: &Session) -> Result<PathBuf>;
}

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct CommentResponse {
    ok: bool,
}

/// [`Publisher`] delegating to a companion upload service.
pub struct HttpPublisher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPublisher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn upload(
        &self,
        task: &UploadTask,
        session_id_map: &HashMap<String, String>,
    ) -> Result<String> {
        let body = json!({
            "session_id": task.session_id,
            "video_path": task.video_path,
            "thumbnail_path": task.thumbnail_path,
            "sc_path": task.sc_path,
            "he_path": task.he_path,
            "title": task.title,
            "description": task.description,
            "tags": task.tags,
            "source": task.source,
            "channel_id": task.channel_id,
            "danmaku": task.danmaku,
            "sessdata": task.credentials.sessdata,
            "bili_jct": task.credentials.bili_jct,
            "session_id_map": session_id_map,
        });
        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: UploadResponse = response.json().await?;
        Ok(parsed.id)
    }

    async fn post_comment(
        &self,
        task: &CommentTask,
        session_id_map: &HashMap<String, String>,
    ) -> Result<bool> {
        // No published video yet: the comment simply waits for a later cycle.
        let Some(video_id) = session_id_map.get(&task.session_id) else {
            debug!(session_id = %task.session_id, "no published id yet, comment deferred");
            return Ok(false);
        };
        let body = json!({
            "video_id": video_id,
            "session_id": task.session_id,
            "content": task.content,
            "danmaku": task.danmaku,
        });
        let response = self
            .client
            .post(format!("{}/comment", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: CommentResponse = response.json().await?;
        Ok(parsed.ok)
    }
}

/// [`VideoGenerator`] running configured external commands.
///
/// Each command is an argv; the session's first recorded file path is
/// appended as the last argument. The command prints the produced file path
/// on stdout. An unconfigured or empty-output early command means no early
/// video.
pub struct CommandVideoGenerator {
    early_command: Option<Vec<String>>,
    danmaku_command: Vec<String>,
}

impl CommandVideoGenerator {
    pub fn new(early_command: Option<Vec<String>>, danmaku_command: Vec<String>) -> Self {
        Self {
            early_command,
            danmaku_command,
        }
    }

    async fn run(&self, argv: &[String], session: &Session) -> Result<String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::generation("empty generator command"))?;
        let input = session
            .videos
            .first()
            .map(|video| video.path.clone())
            .ok_or_else(|| Error::generation("session has no recorded files"))?;

        let output = tokio::process::Command::new(program)
            .args(args)
            .arg(&input)
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::generation(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl VideoGenerator for CommandVideoGenerator {
    async fn early_cut(&self, session: &Session) -> Result<Option<PathBuf>> {
        let Some(command) = &self.early_command else {
            return Ok(None);
        };
        let path = self.run(command, session).await?;
        if path.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PathBuf::from(path)))
        }
    }

    async fn danmaku_cut(&self, session: &Session) -> Result<PathBuf> {
        let path = self.run(&self.danmaku_command, session).await?;
        if path.is_empty() {
            return Err(Error::generation("danmaku cut command produced no path"));
        }
        Ok(PathBuf::from(path))
    }
}
