//! Process-wide table of live sessions and the concurrent stream budget.
//!
//! The session map and the set of sessions holding an upstream stream slot
//! share one lock, so admission decisions and registrations are never seen
//! half-applied.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::session::{DuplexSession, SessionSnapshot};
use crate::errors::{SessionError, SessionResult};

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<String, Arc<DuplexSession>>,
    streams: HashSet<String>,
}

/// Registry counters for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub active_sessions: usize,
    pub streams_in_use: usize,
    pub max_concurrent_streams: usize,
}

pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    max_concurrent_streams: usize,
}

impl SessionRegistry {
    pub fn new(max_concurrent_streams: usize) -> Self {
        info!(
            "Session registry initialized (max concurrent streams: {})",
            max_concurrent_streams
        );
        Self {
            inner: Mutex::new(RegistryInner::default()),
            max_concurrent_streams,
        }
    }

    pub fn max_concurrent_streams(&self) -> usize {
        self.max_concurrent_streams
    }

    pub fn register(&self, session: Arc<DuplexSession>) -> SessionResult<()> {
        let mut inner = self.inner.lock();
        let id = session.id().to_string();
        if inner.sessions.contains_key(&id) {
            return Err(SessionError::DuplicateSession(id));
        }
        debug!(session_id = %id, "Session registered");
        inner.sessions.insert(id, session);
        Ok(())
    }

    pub fn unregister(&self, session_id: &str) -> Option<Arc<DuplexSession>> {
        let removed = self.inner.lock().sessions.remove(session_id);
        if removed.is_some() {
            debug!(session_id = %session_id, "Session unregistered");
        }
        removed
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<DuplexSession>> {
        self.inner.lock().sessions.get(session_id).cloned()
    }

    /// Reserve a stream slot for `session_id`.
    ///
    /// Admitting a session that already holds a slot succeeds without taking
    /// another one.
    pub fn admit(&self, session_id: &str) -> SessionResult<()> {
        let mut inner = self.inner.lock();
        if inner.streams.contains(session_id) {
            return Ok(());
        }
        if inner.streams.len() >= self.max_concurrent_streams {
            warn!(
                session_id = %session_id,
                "Admission rejected: {}/{} streams in use",
                inner.streams.len(),
                self.max_concurrent_streams
            );
            return Err(SessionError::AdmissionRejected {
                limit: self.max_concurrent_streams,
            });
        }
        inner.streams.insert(session_id.to_string());
        debug!(
            session_id = %session_id,
            "Stream slot admitted ({}/{})",
            inner.streams.len(),
            self.max_concurrent_streams
        );
        Ok(())
    }

    /// Give back the slot held by `session_id`. Returns false if it held none.
    pub fn release(&self, session_id: &str) -> bool {
        let released = self.inner.lock().streams.remove(session_id);
        if released {
            debug!(session_id = %session_id, "Stream slot released");
        }
        released
    }

    /// Snapshot of the registered sessions.
    pub fn list_active(&self) -> Vec<Arc<DuplexSession>> {
        self.inner.lock().sessions.values().cloned().collect()
    }

    pub fn last_activity(&self, session_id: &str) -> Option<Instant> {
        self.get(session_id).map(|session| session.last_activity())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn streams_in_use(&self) -> usize {
        self.inner.lock().streams.len()
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            active_sessions: inner.sessions.len(),
            streams_in_use: inner.streams.len(),
            max_concurrent_streams: self.max_concurrent_streams,
        }
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<_> = self
            .list_active()
            .iter()
            .map(|session| session.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        snapshots
    }

    /// Close every session, gracefully where possible within `deadline`.
    ///
    /// Sessions still registered afterwards are force-closed, so the registry
    /// is empty and every slot released when this returns.
    pub async fn teardown(&self, deadline: Duration) {
        let sessions = self.list_active();
        if sessions.is_empty() {
            return;
        }
        info!("Closing {} active session(s)", sessions.len());

        let closes = sessions
            .iter()
            .map(|session| session.close_with_deadline(deadline));
        for result in join_all(closes).await {
            if let Err(e) = result {
                debug!("Session did not close gracefully: {}", e);
            }
        }

        for session in self.list_active() {
            session.force_close_session();
        }
        self.inner.lock().streams.clear();
        info!("Session registry drained");
    }
}
