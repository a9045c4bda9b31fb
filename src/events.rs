//! Recorder lifecycle events.
//!
//! The external recorder reports session lifecycle changes over a webhook
//! as JSON documents with PascalCase fields: an `EventType` discriminator
//! and an `EventData` payload carrying the room/session identifiers plus
//! event-specific fields (file path and timing for `FileClosed`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle event types emitted by the recorder.
///
/// Types this service does not know about are mapped to [`EventType::Unknown`]
/// and still applied as generic session field updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    SessionStarted,
    FileClosed,
    SessionEnded,
    #[serde(other)]
    Unknown,
}

/// Payload of a lifecycle event.
///
/// Only `room_id` and `session_id` are always present; the remaining fields
/// depend on the event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventData {
    pub room_id: u64,
    pub session_id: String,
    /// Streamer display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Current stream title.
    #[serde(default)]
    pub title: Option<String>,
    /// Path of the closed recording file (`FileClosed` only).
    #[serde(default)]
    pub relative_path: Option<String>,
    #[serde(default)]
    pub file_open_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_close_time: Option<DateTime<Utc>>,
}

/// One lifecycle event as delivered by the recorder webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecorderEvent {
    pub event_type: EventType,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_timestamp: Option<DateTime<Utc>>,
    pub event_data: EventData,
}
