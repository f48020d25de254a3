use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{NodeId, Session, SessionId};

/// Convert a std duration to a chrono delta, saturating on overflow.
pub(crate) fn to_delta(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Tracks the current session and the active node.
///
/// A session lasts while activity keeps arriving within the timeout. The
/// first activity after a longer gap starts a new session and forgets the
/// active node, so the next visit cannot attach across the boundary.
#[derive(Debug, Clone)]
pub struct SessionManager {
    timeout: chrono::Duration,
    current: Option<Session>,
    last_activity: Option<DateTime<Utc>>,
    active: Option<NodeId>,
    sessions: Vec<Session>,
}

impl SessionManager {
    /// Create a manager with no session yet.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: to_delta(timeout),
            current: None,
            last_activity: None,
            active: None,
            sessions: Vec::new(),
        }
    }

    /// Make sure a live session exists at `now`.
    ///
    /// Returns `true` when a new session was started. A clock that moved
    /// backwards never counts as a timeout.
    pub fn ensure_session(&mut self, now: DateTime<Utc>) -> bool {
        let expired = match (&self.current, self.last_activity) {
            (None, _) | (_, None) => true,
            (Some(_), Some(last)) => now - last > self.timeout,
        };

        let started = if expired {
            let session = Session::new(now);
            if let Some(previous) = &self.current {
                info!(
                    previous = %previous.id,
                    session = %session.id,
                    "Session timed out, starting new session"
                );
            } else {
                debug!(session = %session.id, "Starting session");
            }
            self.sessions.push(session.clone());
            self.current = Some(session);
            self.active = None;
            true
        } else {
            false
        };

        if self.last_activity.map_or(true, |last| now > last) {
            self.last_activity = Some(now);
        }
        started
    }

    /// The live session, if any.
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Id of the live session, if any.
    pub fn current_id(&self) -> Option<SessionId> {
        self.current.as_ref().map(|s| s.id)
    }

    /// Time of the most recent activity.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    /// The node the user is currently looking at.
    pub fn active_node(&self) -> Option<NodeId> {
        self.active
    }

    /// Replace the active node.
    pub fn set_active(&mut self, node: Option<NodeId>) {
        self.active = node;
    }

    /// Every session known to this manager, in start order.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Look up a session by id.
    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    /// Record a session loaded from storage or an import.
    ///
    /// Returns `false` when the id was already known.
    pub fn register(&mut self, session: Session) -> bool {
        if self.get(&session.id).is_some() {
            return false;
        }
        self.sessions.push(session);
        true
    }

    /// Continue `session` as the live one, as if its last activity had
    /// happened at `last_activity` on `active`.
    pub fn resume(&mut self, session: Session, last_activity: DateTime<Utc>, active: Option<NodeId>) {
        info!(session = %session.id, "Resuming previous session");
        self.register(session.clone());
        self.current = Some(session);
        self.last_activity = Some(last_activity);
        self.active = active;
    }

    /// The configured inactivity timeout.
    pub fn timeout(&self) -> chrono::Duration {
        self.timeout
    }
}
