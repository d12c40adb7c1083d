use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{ConversationTurn, PendingClarification};

/// A session with no activity for this long is dropped.
const SESSION_EXPIRY_HOURS: i64 = 24;
/// A clarification left unanswered for this long stops being merged.
const PENDING_EXPIRY_MINUTES: i64 = 5;

#[derive(Debug)]
struct Session {
    created_at: DateTime<Utc>,
    turns: Vec<ConversationTurn>,
}

impl Session {
    fn last_activity(&self) -> DateTime<Utc> {
        self.turns
            .last()
            .map(|turn| turn.timestamp)
            .unwrap_or(self.created_at)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity() > Duration::hours(SESSION_EXPIRY_HOURS)
    }
}

/// Process-wide conversation state. Expired sessions are swept lazily on
/// access; nothing survives a restart.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the given session id if it is still live; otherwise mint a
    /// fresh one with empty history. Expired sessions are deleted here, so
    /// presenting a stale id behaves exactly like presenting none.
    pub fn get_or_create(&self, session_id: Option<&str>) -> String {
        let now = Utc::now();
        let mut guard = lock(&self.inner);
        guard.retain(|_, session| !session.is_expired(now));

        if let Some(id) = session_id {
            if guard.contains_key(id) {
                return id.to_string();
            }
        }

        let id = Uuid::new_v4().to_string();
        guard.insert(
            id.clone(),
            Session {
                created_at: now,
                turns: Vec::new(),
            },
        );
        id
    }

    /// Most recent `max_turns` turns, oldest first.
    pub fn history(&self, session_id: &str, max_turns: usize) -> Vec<(String, String)> {
        let guard = lock(&self.inner);
        let Some(session) = guard.get(session_id) else {
            return vec![];
        };

        let skip = session.turns.len().saturating_sub(max_turns);
        session.turns[skip..]
            .iter()
            .map(|turn| (turn.question.clone(), turn.answer.clone()))
            .collect()
    }

    pub fn append(&self, session_id: &str, question: &str, answer: &str) {
        let mut guard = lock(&self.inner);
        let session = guard
            .entry(session_id.to_string())
            .or_insert_with(|| Session {
                created_at: Utc::now(),
                turns: Vec::new(),
            });

        session.turns.push(ConversationTurn {
            question: question.to_string(),
            answer: answer.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Remove the session entirely. Returns false when nothing was stored
    /// under that id.
    pub fn clear(&self, session_id: &str) -> bool {
        lock(&self.inner).remove(session_id).is_some()
    }
}

/// At most one pending clarification per session; a new one replaces any
/// older record. Expired records are swept lazily whenever the store is
/// consulted.
#[derive(Clone, Default)]
pub struct PendingClarificationStore {
    inner: Arc<Mutex<HashMap<String, PendingClarification>>>,
}

impl PendingClarificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, pending: PendingClarification) {
        lock(&self.inner).insert(pending.session_id.clone(), pending);
    }

    /// Consume the pending record for this session, if one exists and has
    /// not expired.
    pub fn take(&self, session_id: &str) -> Option<PendingClarification> {
        let now = Utc::now();
        let mut guard = lock(&self.inner);
        guard.retain(|_, pending| {
            now - pending.created_at <= Duration::minutes(PENDING_EXPIRY_MINUTES)
        });
        guard.remove(session_id)
    }

    pub fn remove(&self, session_id: &str) -> bool {
        lock(&self.inner).remove(session_id).is_some()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_live_session_is_returned_unchanged() {
        let store = SessionStore::new();
        let id = store.get_or_create(None);
        store.append(&id, "q1", "a1");

        let again = store.get_or_create(Some(&id));
        assert_eq!(again, id);
    }

    #[test]
    fn expired_session_is_replaced_with_a_fresh_id() {
        let store = SessionStore::new();
        let id = store.get_or_create(None);
        store.append(&id, "q1", "a1");

        // Age the last turn past the expiry window.
        {
            let mut guard = lock(&store.inner);
            let session = guard.get_mut(&id).expect("session exists");
            session.turns[0].timestamp = Utc::now() - Duration::hours(25);
        }

        let fresh = store.get_or_create(Some(&id));
        assert_ne!(fresh, id);
        assert!(store.history(&id, 10).is_empty());
    }

    #[test]
    fn history_returns_most_recent_turns_oldest_first() {
        let store = SessionStore::new();
        let id = store.get_or_create(None);
        for n in 1..=7 {
            store.append(&id, &format!("q{n}"), &format!("a{n}"));
        }

        let history = store.history(&id, 3);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].0, "q5");
        assert_eq!(history[2].0, "q7");
    }

    #[test]
    fn clear_signals_missing_sessions() {
        let store = SessionStore::new();
        let id = store.get_or_create(None);
        assert!(store.clear(&id));
        assert!(!store.clear(&id));
        assert!(!store.clear("never-existed"));
    }

    fn pending(session_id: &str, age_minutes: i64) -> PendingClarification {
        PendingClarification {
            session_id: session_id.to_string(),
            original_question: "What is section 17(5) of GST act".to_string(),
            clarification_question: "Which Act are you referring to?".to_string(),
            context: "Section 17(5) exists in multiple GST Acts.".to_string(),
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn pending_record_is_consumed_on_take() {
        let store = PendingClarificationStore::new();
        store.put(pending("s1", 0));

        assert!(store.take("s1").is_some());
        assert!(store.take("s1").is_none());
    }

    #[test]
    fn expired_pending_record_is_not_returned() {
        let store = PendingClarificationStore::new();
        store.put(pending("s1", 6));
        assert!(store.take("s1").is_none());
    }

    #[test]
    fn newer_pending_record_replaces_older_one() {
        let store = PendingClarificationStore::new();
        store.put(pending("s1", 2));
        let mut newer = pending("s1", 0);
        newer.original_question = "What is section 9 of GST act".to_string();
        store.put(newer);

        let taken = store.take("s1").expect("pending exists");
        assert_eq!(taken.original_question, "What is section 9 of GST act");
    }
}
