//! A chat session: one conversation thread bound to one browser tab.

use chatbridge_browser::Tab;
use chatbridge_core::{Error, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Creating,
    Ready,
    Busy,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Creating => write!(f, "CREATING"),
            SessionState::Ready => write!(f, "READY"),
            SessionState::Busy => write!(f, "BUSY"),
            SessionState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Snapshot for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub chat_id: String,
    pub state: SessionState,
    pub idle_secs: u64,
}

struct Meta {
    state: SessionState,
    last_activity: Instant,
}

pub struct Session {
    id: String,
    tab: Arc<dyn Tab>,
    meta: Mutex<Meta>,
    /// Held for the whole of an exchange, including any post-timeout settling.
    turn: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("target", &self.tab.target_id())
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    pub fn new(id: impl Into<String>, tab: Arc<dyn Tab>) -> Self {
        Self {
            id: id.into(),
            tab,
            meta: Mutex::new(Meta {
                state: SessionState::Creating,
                last_activity: Instant::now(),
            }),
            turn: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tab(&self) -> &Arc<dyn Tab> {
        &self.tab
    }

    fn meta(&self) -> MutexGuard<'_, Meta> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        self.meta().state
    }

    pub fn idle_for(&self) -> Duration {
        self.meta().last_activity.elapsed()
    }

    pub fn info(&self) -> SessionInfo {
        let meta = self.meta();
        SessionInfo {
            chat_id: self.id.clone(),
            state: meta.state,
            idle_secs: meta.last_activity.elapsed().as_secs(),
        }
    }

    pub fn mark_ready(&self) {
        let mut meta = self.meta();
        if meta.state == SessionState::Creating {
            meta.state = SessionState::Ready;
            meta.last_activity = Instant::now();
        }
    }

    pub fn touch(&self) {
        self.meta().last_activity = Instant::now();
    }

    /// Move to `CLOSED`. Returns false if it already was.
    pub fn mark_closed(&self) -> bool {
        let mut meta = self.meta();
        let was_open = meta.state != SessionState::Closed;
        meta.state = SessionState::Closed;
        was_open
    }

    /// `READY` → `CLOSED` if idle longer than `max_idle`; a no-op in any
    /// other state, so a session that just went `BUSY` is never evicted.
    pub fn close_if_idle(&self, max_idle: Duration) -> bool {
        let mut meta = self.meta();
        if meta.state == SessionState::Ready && meta.last_activity.elapsed() > max_idle {
            meta.state = SessionState::Closed;
            true
        } else {
            false
        }
    }

    /// Wait for any previous exchange to finish, then mark the session `BUSY`.
    /// The returned [`Turn`] puts it back to `READY` when dropped.
    pub async fn begin(self: &Arc<Self>) -> Result<Turn> {
        let guard = self.turn.clone().lock_owned().await;
        let mut meta = self.meta();
        if meta.state == SessionState::Closed {
            return Err(Error::SessionClosed(format!("Session {} was closed", self.id)));
        }
        meta.state = SessionState::Busy;
        drop(meta);
        Ok(Turn {
            session: self.clone(),
            _guard: guard,
        })
    }
}

/// Exclusive use of a session for one exchange.
pub struct Turn {
    session: Arc<Session>,
    _guard: OwnedMutexGuard<()>,
}

impl Turn {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Record a completed exchange and release the session.
    pub fn complete(self) {
        self.session.touch();
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        let mut meta = self.session.meta();
        if meta.state == SessionState::Busy {
            meta.state = SessionState::Ready;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDriver;
    use chatbridge_browser::BrowserDriver;

    async fn session() -> Arc<Session> {
        let driver = FakeDriver::new();
        let tab = driver.open_tab().await.unwrap();
        Arc::new(Session::new("s1", tab))
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let s = session().await;
        assert_eq!(s.state(), SessionState::Creating);
        s.mark_ready();
        assert_eq!(s.state(), SessionState::Ready);

        let turn = s.begin().await.unwrap();
        assert_eq!(s.state(), SessionState::Busy);
        turn.complete();
        assert_eq!(s.state(), SessionState::Ready);

        assert!(s.mark_closed());
        assert!(!s.mark_closed());
        assert_eq!(s.begin().await.err().map(|e| e.kind()), Some("SessionClosed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_if_idle_skips_busy() {
        let s = session().await;
        s.mark_ready();
        let turn = s.begin().await.unwrap();
        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(!s.close_if_idle(Duration::from_secs(300)));
        drop(turn);
        assert!(s.close_if_idle(Duration::from_secs(300)));
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_turn_waits() {
        let s = session().await;
        s.mark_ready();
        let first = s.begin().await.unwrap();

        let s2 = s.clone();
        let waiter = tokio::spawn(async move { s2.begin().await.map(|_| ()) });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_debug_shows_id_and_state() {
        let s = session().await;
        s.mark_ready();
        let shown = format!("{:?}", s);
        assert!(shown.contains("\"s1\""));
        assert!(shown.contains("Ready"));
        assert!(shown.contains("target-"));
    }

    #[test]
    fn test_info_serializes() {
        let info = SessionInfo {
            chat_id: "abc".into(),
            state: SessionState::Ready,
            idle_secs: 4,
        };
        let v = serde_json::to_value(&info).unwrap();
        assert_eq!(v["chatId"], "abc");
        assert_eq!(v["state"], "READY");
        assert_eq!(v["idleSecs"], 4);
    }
}
