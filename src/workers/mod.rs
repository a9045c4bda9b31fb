//! Background worker loops.
//!
//! Two long-lived loops drain the task queues: [`UploadWorker`] performs
//! uploads with a bounded retry budget, [`CommentWorker`] posts comments on
//! a fixed cycle with unbounded retries. Both synchronize with the rest of
//! the process only through the queues and the save store.

mod comment;
mod upload;

pub use comment::CommentWorker;
pub use upload::UploadWorker;
