//! rec-publisher: automatic upload and comment publishing for live stream
//! recordings.
//!
//! The external recorder reports session lifecycle events over a webhook.
//! This crate reconciles those events into sessions (including merging a
//! stream that reconnects within a few minutes), runs a per-session upload
//! workflow once a session ends, and drives uploads and follow-up comment
//! posts through durable, retrying work queues that survive restarts.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod publisher;
pub mod queue;
pub mod save;
pub mod session;
pub mod tasks;
pub mod template;
pub mod workers;
pub mod workflow;

pub use error::{Error, Result};
