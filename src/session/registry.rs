//! Session registry with continuation merging.
//!
//! Streamers frequently drop and reconnect within a few minutes; the
//! recorder then reports a brand new session id for what is logically the
//! same stream. The registry aliases such a restart onto the still-recent
//! ended session instead of creating a second one, and cancels that
//! session's in-flight upload workflow so a truncated video is not
//! published alongside the full one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{Session, SessionHandle};
use crate::events::EventData;

/// Outcome of [`SessionRegistry::on_session_started`].
pub enum Started {
    /// A new session was registered.
    Fresh(Arc<SessionHandle>),
    /// The start was merged into a recent ended session for the same room.
    /// Any in-flight workflow on that session has been cancelled.
    Merged(Arc<SessionHandle>),
}

impl Started {
    pub fn handle(&self) -> &Arc<SessionHandle> {
        match self {
            Started::Fresh(handle) | Started::Merged(handle) => handle,
        }
    }
}

/// Maps recorder session ids to session handles.
///
/// After a merge, two (or more) ids point at the same handle. Entries are
/// retained until [`SessionRegistry::evict_expired`] removes them, which is
/// only legal once the workflow has finished and the continuation window
/// has passed, so a late restart can still find its predecessor.
pub struct SessionRegistry {
    continuation_window: Duration,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new(continuation_window: Duration) -> Self {
        Self {
            continuation_window,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Handle a `SessionStarted` event.
    ///
    /// Scans for a session of the same room that ended less than the
    /// continuation window ago. If one exists the new id is aliased to it
    /// and its workflow cancelled; otherwise a fresh session is registered.
    pub fn on_session_started(&self, data: &EventData, now: DateTime<Utc>) -> Started {
        let mut sessions = self.sessions.write();

        let continuation = sessions
            .values()
            .find(|handle| {
                handle.with_session(|session| {
                    session.room_id == data.room_id
                        && session
                            .end_time
                            .is_some_and(|end| now - end < self.continuation_window)
                })
            })
            .cloned();

        if let Some(handle) = continuation {
            sessions.insert(data.session_id.clone(), handle.clone());
            drop(sessions);
            if handle.cancel_workflow() {
                info!(
                    room_id = data.room_id,
                    session_id = %data.session_id,
                    "session resumed within continuation window, workflow cancelled"
                );
            } else {
                info!(
                    room_id = data.room_id,
                    session_id = %data.session_id,
                    "session resumed within continuation window"
                );
            }
            return Started::Merged(handle);
        }

        let handle = SessionHandle::new(Session::new(data, now));
        sessions.insert(data.session_id.clone(), handle.clone());
        debug!(room_id = data.room_id, session_id = %data.session_id, "session registered");
        Started::Fresh(handle)
    }

    /// Look up a session by recorder id.
    pub fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Number of registered ids (aliases count separately).
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Remove entries whose workflow finished and whose end time is older
    /// than the continuation window. Returns the number of ids removed.
    ///
    /// `now` is the caller's wall clock while `end_time` comes from the
    /// recorder's event timestamps; recorder clock skew shifts the
    /// effective retention accordingly. Callers schedule this well after
    /// the window has passed, so a skew of minutes only delays or hastens
    /// retirement, never the merge decision itself (which compares event
    /// timestamps against each other).
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, handle| {
            let expired = handle.workflow_finished()
                && handle.with_session(|session| {
                    session
                        .end_time
                        .is_some_and(|end| now - end >= self.continuation_window)
                });
            !expired
        });
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "evicted expired sessions");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventData;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Duration::minutes(5))
    }

    fn started(room_id: u64, session_id: &str) -> EventData {
        EventData {
            room_id,
            session_id: session_id.to_string(),
            name: Some("streamer".to_string()),
            title: Some("title".to_string()),
            relative_path: None,
            file_open_time: None,
            file_close_time: None,
        }
    }

    #[test]
    fn test_restart_within_window_merges() {
        let registry = registry();
        let t0 = Utc::now();

        let first = registry.on_session_started(&started(1, "s-1"), t0);
        assert!(matches!(first, Started::Fresh(_)));
        first.handle().with_session_mut(|s| s.end_at(t0));

        let second = registry.on_session_started(&started(1, "s-2"), t0 + Duration::minutes(2));
        assert!(matches!(second, Started::Merged(_)));
        assert!(Arc::ptr_eq(first.handle(), second.handle()));
        // Both ids resolve to the one session.
        assert!(Arc::ptr_eq(
            &registry.get("s-1").unwrap(),
            &registry.get("s-2").unwrap()
        ));
    }

    #[test]
    fn test_restart_outside_window_is_fresh() {
        let registry = registry();
        let t0 = Utc::now();

        let first = registry.on_session_started(&started(1, "s-1"), t0);
        first.handle().with_session_mut(|s| s.end_at(t0));

        let second = registry.on_session_started(&started(1, "s-2"), t0 + Duration::minutes(7));
        assert!(matches!(second, Started::Fresh(_)));
        assert!(!Arc::ptr_eq(first.handle(), second.handle()));
    }

    #[test]
    fn test_other_room_never_merges() {
        let registry = registry();
        let t0 = Utc::now();

        let first = registry.on_session_started(&started(1, "s-1"), t0);
        first.handle().with_session_mut(|s| s.end_at(t0));

        let second = registry.on_session_started(&started(2, "s-2"), t0 + Duration::minutes(1));
        assert!(matches!(second, Started::Fresh(_)));
    }

    #[test]
    fn test_unended_session_never_merges() {
        let registry = registry();
        let t0 = Utc::now();

        registry.on_session_started(&started(1, "s-1"), t0);
        let second = registry.on_session_started(&started(1, "s-2"), t0 + Duration::minutes(1));
        assert!(matches!(second, Started::Fresh(_)));
    }

    #[test]
    fn test_merge_cancels_workflow() {
        let registry = registry();
        let t0 = Utc::now();

        let first = registry.on_session_started(&started(1, "s-1"), t0);
        first.handle().with_session_mut(|s| s.end_at(t0));
        let (token, _) = first.handle().begin_workflow();

        registry.on_session_started(&started(1, "s-2"), t0 + Duration::minutes(1));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_merged_back_session_survives_eviction() {
        let registry = registry();
        let t0 = Utc::now();

        // First session ends and its workflow finishes quickly (e.g. a
        // no-uploader room), leaving the slot in the finished state.
        let first = registry.on_session_started(&started(1, "s-1"), t0);
        first.handle().with_session_mut(|s| s.end_at(t0));
        let (_, generation) = first.handle().begin_workflow();
        first.handle().finish_workflow(generation);
        assert!(first.handle().workflow_finished());

        // The room restarts inside the window and merges back in.
        let second = registry.on_session_started(&started(1, "s-2"), t0 + Duration::minutes(2));
        assert!(matches!(second, Started::Merged(_)));

        // The eviction pass scheduled by the earlier run fires after the
        // window; the live session must not be removed by it.
        assert_eq!(registry.evict_expired(t0 + Duration::minutes(6)), 0);
        assert!(registry.get("s-1").is_some());
        assert!(registry.get("s-2").is_some());
    }

    #[test]
    fn test_evict_expired() {
        let registry = registry();
        let t0 = Utc::now();

        let entry = registry.on_session_started(&started(1, "s-1"), t0);
        entry.handle().with_session_mut(|s| s.end_at(t0));
        let (_, generation) = entry.handle().begin_workflow();

        // Workflow still running: nothing to evict even past the window.
        assert_eq!(registry.evict_expired(t0 + Duration::minutes(10)), 0);

        entry.handle().finish_workflow(generation);
        // Finished but within the window: still reachable for a merge.
        assert_eq!(registry.evict_expired(t0 + Duration::minutes(3)), 0);
        assert_eq!(registry.evict_expired(t0 + Duration::minutes(10)), 1);
        assert!(registry.get("s-1").is_none());
    }
}
