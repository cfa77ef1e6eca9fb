//! Server-side session map holding each session's access gate.

use chrono::{DateTime, Duration, Utc};
use hashbrown::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use canvass::access::{AccessGate, GateState};

struct Session {
    gate: AccessGate,
    last_seen: DateTime<Utc>,
    /// Access order, for evicting the least recently used session
    touched: u64,
}

struct Sessions {
    map: HashMap<Uuid, Session>,
    clock: u64,
}

impl Sessions {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Gate state per session id. The lock is never held across an await.
///
/// Sessions idle longer than `idle_timeout` are pruned on create; beyond
/// `max_sessions` the least recently used one is evicted.
pub struct SessionStore {
    sessions: Mutex<Sessions>,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(Sessions {
                map: HashMap::new(),
                clock: 0,
            }),
            idle_timeout,
            max_sessions: max_sessions.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Sessions> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a new session, dropping idle ones
    pub fn create(&self) -> (Uuid, GateState) {
        let now = Utc::now();
        let mut sessions = self.lock();
        sessions
            .map
            .retain(|_, s| now - s.last_seen < self.idle_timeout);

        while sessions.map.len() >= self.max_sessions {
            let oldest = sessions
                .map
                .iter()
                .min_by_key(|(_, s)| s.touched)
                .map(|(id, _)| *id);
            let Some(oldest) = oldest else { break };
            sessions.map.remove(&oldest);
            debug!("Evicted session {}", oldest);
        }

        let id = Uuid::new_v4();
        let gate = AccessGate::new();
        let state = gate.state();
        let touched = sessions.tick();
        sessions.map.insert(
            id,
            Session {
                gate,
                last_seen: now,
                touched,
            },
        );
        (id, state)
    }

    /// Run `f` on the session's gate; `None` if the session is unknown
    pub fn with_gate<T>(&self, id: &Uuid, f: impl FnOnce(&mut AccessGate) -> T) -> Option<T> {
        let mut sessions = self.lock();
        let touched = sessions.tick();
        let session = sessions.map.get_mut(id)?;
        session.last_seen = Utc::now();
        session.touched = touched;
        Some(f(&mut session.gate))
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let store = SessionStore::new(Duration::hours(12), 100);
        let (id, state) = store.create();
        assert_eq!(state, GateState::Unset);
        assert_eq!(store.with_gate(&id, |g| g.begin()), Some(GateState::Pending));
        assert!(store.with_gate(&Uuid::new_v4(), |g| g.state()).is_none());
    }

    #[test]
    fn test_idle_sessions_are_dropped() {
        let store = SessionStore::new(Duration::zero(), 100);
        store.create();
        store.create();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_session_count_is_bounded() {
        let store = SessionStore::new(Duration::hours(12), 2);
        let (first, _) = store.create();
        let (second, _) = store.create();

        // Touch the first so the second becomes least recently used
        store.with_gate(&first, |g| g.state());
        let (third, _) = store.create();

        assert_eq!(store.len(), 2);
        assert!(store.with_gate(&first, |g| g.state()).is_some());
        assert!(store.with_gate(&second, |g| g.state()).is_none());
        assert!(store.with_gate(&third, |g| g.state()).is_some());

        for _ in 0..10 {
            store.create();
        }
        assert_eq!(store.len(), 2);
    }
}
