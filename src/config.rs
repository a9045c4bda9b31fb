//! Typed application configuration.
//!
//! Configuration is loaded once at startup from a JSON file and shared
//! immutably (`Arc<AppConfig>`) across the manager, workflows and workers.
//! Per-room publishing settings are resolved by room id, uploader accounts
//! by the account key referenced from a room.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn default_continue_session_minutes() -> u64 {
    5
}

fn default_wait_session_minutes() -> u64 {
    6
}

fn default_max_upload_trials() -> u32 {
    5
}

fn default_comment_interval_secs() -> u64 {
    60
}

/// Retry / timing policy knobs.
///
/// All of these have defaults matching the long-standing production
/// behavior; they exist as configuration so operators can tune them
/// without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// A session restarting within this window after ending is treated as a
    /// continuation of the ended session.
    #[serde(default = "default_continue_session_minutes")]
    pub continue_session_minutes: u64,
    /// Delay between queueing the early upload and queueing its comment.
    #[serde(default = "default_wait_session_minutes")]
    pub wait_session_minutes: u64,
    /// Upload attempts before a task is dropped permanently.
    #[serde(default = "default_max_upload_trials")]
    pub max_upload_trials: u32,
    /// Period of the comment posting cycle.
    #[serde(default = "default_comment_interval_secs")]
    pub comment_interval_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            continue_session_minutes: default_continue_session_minutes(),
            wait_session_minutes: default_wait_session_minutes(),
            max_upload_trials: default_max_upload_trials(),
            comment_interval_secs: default_comment_interval_secs(),
        }
    }
}

/// Publishing settings for one recorded room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Room id as reported by the recorder.
    pub id: u64,
    /// Video title template (supports `$name` / `${name}` placeholders).
    pub title: String,
    /// Video description template (same placeholder set).
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Destination channel / category id on the publishing platform.
    pub channel_id: u64,
    /// Reprint source URL, if the upload should be marked as a reprint.
    #[serde(default)]
    pub source: Option<String>,
    /// Key into [`AppConfig::accounts`]. `None` means recordings of this
    /// room are never uploaded.
    #[serde(default)]
    pub uploader: Option<String>,
}

/// Credentials and display name of one uploader account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderAccount {
    pub name: String,
    pub sessdata: String,
    pub bili_jct: String,
}

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub rooms: Vec<RoomConfig>,
    #[serde(default)]
    pub accounts: HashMap<String, UploaderAccount>,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Base URL of the companion upload service.
    #[serde(default)]
    pub upload_service_url: Option<String>,
    /// External command producing the early (no-danmaku) cut.
    #[serde(default)]
    pub early_cut_command: Option<Vec<String>>,
    /// External command producing the danmaku-burned cut.
    #[serde(default)]
    pub danmaku_cut_command: Option<Vec<String>>,
}

impl AppConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Resolve the room configuration for a room id.
    pub fn room(&self, room_id: u64) -> Option<&RoomConfig> {
        self.rooms.iter().find(|room| room.id == room_id)
    }

    /// Resolve an uploader account by its key.
    pub fn account(&self, key: &str) -> Option<&UploaderAccount> {
        self.accounts.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let policy = PolicyConfig::default();
        assert_eq!(policy.continue_session_minutes, 5);
        assert_eq!(policy.wait_session_minutes, 6);
        assert_eq!(policy.max_upload_trials, 5);
        assert_eq!(policy.comment_interval_secs, 60);
    }

    #[test]
    fn test_parse_minimal_config() {
        let raw = r#"{
            "rooms": [
                {
                    "id": 23058,
                    "title": "${name} ${yy}-${mm}-${dd}",
                    "description": "recording of ${title}",
                    "channel_id": 171,
                    "uploader": "main"
                }
            ],
            "accounts": {
                "main": { "name": "uploader", "sessdata": "s", "bili_jct": "j" }
            }
        }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.rooms.len(), 1);
        assert_eq!(config.policy.max_upload_trials, 5);
        assert!(config.room(23058).is_some());
        assert!(config.room(1).is_none());
        assert_eq!(config.account("main").unwrap().name, "uploader");
    }

    #[test]
    fn test_room_without_uploader() {
        let raw = r#"{
            "rooms": [
                { "id": 1, "title": "t", "description": "d", "channel_id": 0 }
            ]
        }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert!(config.room(1).unwrap().uploader.is_none());
    }
}
