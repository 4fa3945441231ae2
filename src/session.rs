//! In-memory conversation sessions.
//!
//! Each session keeps the most recent exchanges only, evicted FIFO past the
//! configured cap. Sessions live for the process lifetime; there is no
//! persistence.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use uuid::Uuid;

use crate::models::Exchange;

pub struct SessionManager {
    sessions: Mutex<HashMap<String, VecDeque<Exchange>>>,
    max_history: usize,
}

impl SessionManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_history,
        }
    }

    pub fn create_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), VecDeque::new());
        id
    }

    /// Record one (query, answer) exchange, evicting the oldest past the cap.
    /// Unknown session ids are created implicitly.
    pub fn add_exchange(&self, session_id: &str, query: &str, answer: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push_back(Exchange {
            query: query.to_string(),
            answer: answer.to_string(),
        });
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    /// Formatted history for the system prompt, or `None` for an unknown or
    /// empty session.
    pub fn history(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let history = sessions.get(session_id)?;
        if history.is_empty() {
            return None;
        }
        let lines: Vec<String> = history
            .iter()
            .map(|ex| format!("User: {}\nAssistant: {}", ex.query, ex.answer))
            .collect();
        Some(lines.join("\n"))
    }

    pub fn clear_session(&self, session_id: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_session_returns_unique_ids() {
        let manager = SessionManager::new(2);
        let a = manager.create_session();
        let b = manager.create_session();
        assert_ne!(a, b);
        assert!(manager.history(&a).is_none());
    }

    #[test]
    fn history_formats_user_and_assistant_turns() {
        let manager = SessionManager::new(2);
        let id = manager.create_session();
        manager.add_exchange(&id, "What is RAG?", "Retrieval augmented generation.");
        let history = manager.history(&id).unwrap();
        assert_eq!(
            history,
            "User: What is RAG?\nAssistant: Retrieval augmented generation."
        );
    }

    #[test]
    fn oldest_exchanges_evicted_past_cap() {
        let manager = SessionManager::new(2);
        let id = manager.create_session();
        manager.add_exchange(&id, "q1", "a1");
        manager.add_exchange(&id, "q2", "a2");
        manager.add_exchange(&id, "q3", "a3");

        let history = manager.history(&id).unwrap();
        assert!(!history.contains("q1"));
        assert!(history.contains("q2"));
        assert!(history.contains("q3"));
    }

    #[test]
    fn unknown_session_created_on_first_exchange() {
        let manager = SessionManager::new(2);
        manager.add_exchange("external-id", "hello", "hi");
        assert!(manager.history("external-id").unwrap().contains("hello"));
    }

    #[test]
    fn clear_session_drops_history() {
        let manager = SessionManager::new(2);
        let id = manager.create_session();
        manager.add_exchange(&id, "q", "a");
        manager.clear_session(&id);
        assert!(manager.history(&id).is_none());
    }
}
