//! Per-session upload workflow.
//!
//! Runs once a session has ended: resolves the room's publishing
//! configuration, renders title and description, then drives the early cut
//! and the danmaku cut through the upload queue with the follow-up comment
//! queued at the right point. The routine suspends at the two generation
//! calls and at one fixed delay; each session runs as its own task and
//! cancellation (on a continuation merge) is applied from outside by
//! wrapping the whole future, so tasks already handed to a queue are never
//! retracted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{AppConfig, RoomConfig, UploaderAccount};
use crate::publisher::VideoGenerator;
use crate::queue::TaskSender;
use crate::session::{Session, SessionHandle};
use crate::tasks::{CommentTask, Credentials, UploadTask};
use crate::template;
use crate::{Error, Result};

/// Orchestrates publishing for ended sessions.
pub struct UploadWorkflow {
    config: Arc<AppConfig>,
    generator: Arc<dyn VideoGenerator>,
    upload_queue: TaskSender<UploadTask>,
    comment_queue: TaskSender<CommentTask>,
    /// Delay between queueing an upload and queueing its comment.
    wait_delay: Duration,
}

impl UploadWorkflow {
    pub fn new(
        config: Arc<AppConfig>,
        generator: Arc<dyn VideoGenerator>,
        upload_queue: TaskSender<UploadTask>,
        comment_queue: TaskSender<CommentTask>,
    ) -> Self {
        let wait_delay = Duration::from_secs(config.policy.wait_session_minutes * 60);
        Self {
            config,
            generator,
            upload_queue,
            comment_queue,
            wait_delay,
        }
    }

    /// Run the workflow for one ended session.
    ///
    /// A missing room configuration is an error (someone must fix the
    /// config); a room without an uploader is a normal no-op.
    pub async fn run(&self, handle: &Arc<SessionHandle>) -> Result<()> {
        let session = handle.snapshot();

        let room = self.config.room(session.room_id).ok_or_else(|| {
            Error::config(format!("no room config for room {}", session.room_id))
        })?;
        let Some(uploader_key) = &room.uploader else {
            debug!(room_id = session.room_id, "room has no uploader, skipping");
            return Ok(());
        };
        let account = self.config.account(uploader_key).ok_or_else(|| {
            Error::config(format!(
                "room {} references unknown uploader account {uploader_key}",
                session.room_id
            ))
        })?;

        let vars = template_vars(&session, account);
        let title = template::substitute(&room.title, &vars)?;
        let description = template::substitute(&room.description, &vars)?;

        let mut early_task = None;
        if let Some(early_path) = self.generator.early_cut(&session).await? {
            handle.with_session_mut(|s| s.early_video_path = Some(early_path.clone()));
            let task = build_upload_task(
                &session, room, account, &title, &description, &early_path, false,
            )?;
            info!(session_id = %session.session_id, "queueing early upload");
            self.upload_queue.push(task.clone());
            early_task = Some(task);
        }

        tokio::time::sleep(self.wait_delay).await;

        if let Some(task) = &early_task {
            self.comment_queue.push(CommentTask::from_upload(task));
        }

        let danmaku_path = self.generator.danmaku_cut(&session).await?;
        let danmaku_task = build_upload_task(
            &session,
            room,
            account,
            &title,
            &description,
            &danmaku_path,
            true,
        )?;
        info!(session_id = %session.session_id, "queueing danmaku upload");
        self.upload_queue.push(danmaku_task.clone());

        if early_task.is_none() {
            self.comment_queue
                .push(CommentTask::from_upload(&danmaku_task));
        }
        Ok(())
    }
}

/// Placeholder values available to title/description templates.
fn template_vars(session: &Session, account: &UploaderAccount) -> HashMap<&'static str, String> {
    let start = session.start_time;
    let mut vars = HashMap::from([
        ("name", session.room_name.clone()),
        ("title", session.room_title.clone()),
        ("uploader_name", account.name.clone()),
        ("y", start.format("%-Y").to_string()),
        ("m", start.format("%-m").to_string()),
        ("d", start.format("%-d").to_string()),
        ("yy", start.format("%Y").to_string()),
        ("mm", start.format("%m").to_string()),
        ("dd", start.format("%d").to_string()),
    ]);
    if let Some(video) = session.videos.first() {
        vars.insert("flv_path", video.path.display().to_string());
    }
    vars
}

fn build_upload_task(
    session: &Session,
    room: &RoomConfig,
    account: &UploaderAccount,
    title: &str,
    description: &str,
    video_path: &Path,
    danmaku: bool,
) -> Result<UploadTask> {
    let outputs = session
        .output_paths()
        .ok_or_else(|| Error::upload("session has no recorded files"))?;
    Ok(UploadTask {
        session_id: session.session_id.clone(),
        video_path: video_path.to_path_buf(),
        thumbnail_path: outputs.thumbnail,
        sc_path: outputs.sc_file,
        he_path: outputs.he_file,
        title: title.to_string(),
        description: description.to_string(),
        tags: room.tags.clone(),
        source: room.source.clone(),
        channel_id: room.channel_id,
        danmaku,
        credentials: Credentials {
            sessdata: account.sessdata.clone(),
            bili_jct: account.bili_jct.clone(),
        },
        trial: 0,
    })
}
