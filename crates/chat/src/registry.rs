//! Session registry: external chat id → live session/tab.

use chatbridge_browser::{BrowserDriver, Tab, WaitCondition};
use chatbridge_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::session::{Session, SessionInfo, SessionState};
use crate::site::SiteProfile;

type CreationLock = tokio::sync::Mutex<()>;

pub struct SessionRegistry {
    driver: Arc<dyn BrowserDriver>,
    site: Arc<SiteProfile>,
    /// Bound for navigation and new-conversation waits during creation.
    creation_timeout: Duration,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// Per-id locks so concurrent first requests for one id create one session.
    creating: Mutex<HashMap<String, Weak<CreationLock>>>,
}

impl SessionRegistry {
    pub fn new(driver: Arc<dyn BrowserDriver>, site: Arc<SiteProfile>, creation_timeout: Duration) -> Self {
        Self {
            driver,
            site,
            creation_timeout,
            sessions: RwLock::new(HashMap::new()),
            creating: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live session for `id`, or create one. `None` (or an empty
    /// id) always starts a new conversation; an id the site no longer knows
    /// yields a session with a fresh id.
    pub async fn resolve(&self, id: Option<&str>) -> Result<Arc<Session>> {
        let Some(id) = id.map(str::trim).filter(|s| !s.is_empty()) else {
            return self.create(None).await;
        };

        if let Some(session) = self.lookup_live(id).await {
            return Ok(session);
        }

        let lock = self.creation_lock(id);
        let _creating = lock.lock().await;
        if let Some(session) = self.lookup_live(id).await {
            debug!(session = %id, "Reusing session created by a concurrent request");
            return Ok(session);
        }
        self.create(Some(id)).await
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn touch(&self, id: &str) {
        if let Some(session) = self.get(id).await {
            session.touch();
        }
    }

    /// Close every `READY` session idle for longer than `max_idle`.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let candidates: Vec<Arc<Session>> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.state() == SessionState::Ready && s.idle_for() > max_idle)
            .cloned()
            .collect();

        let mut evicted = 0;
        for session in candidates {
            if !session.close_if_idle(max_idle) {
                continue;
            }
            self.unregister(&session).await;
            release_tab(&session).await;
            info!(session = %session.id(), "Evicted idle session");
            evicted += 1;
        }
        evicted
    }

    /// Close one session. Returns false if `id` is not registered.
    pub async fn close(&self, id: &str) -> bool {
        let Some(session) = self.sessions.write().await.remove(id) else {
            return false;
        };
        session.mark_closed();
        release_tab(&session).await;
        info!(session = %id, "Session closed");
        true
    }

    pub async fn close_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.mark_closed();
            release_tab(session).await;
        }
        sessions.len()
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.sessions.read().await.values().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.chat_id.cmp(&b.chat_id));
        infos
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn creation_lock(&self, id: &str) -> Arc<CreationLock> {
        let mut creating = self.creating.lock().unwrap_or_else(PoisonError::into_inner);
        creating.retain(|_, lock| lock.strong_count() > 0);
        if let Some(lock) = creating.get(id).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(CreationLock::new(()));
        creating.insert(id.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// The registered session for `id`, if its tab is still alive and still
    /// showing that conversation. A dead entry is dropped on the way.
    async fn lookup_live(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.get(id).await?;

        let alive = session.state() != SessionState::Closed
            && !session.tab().is_closed()
            && match session.tab().url().await {
                Ok(url) => self.site.thread_id(&url).as_deref() == Some(id),
                Err(e) => {
                    debug!(session = %id, error = %e, "Session tab unreachable");
                    false
                }
            };

        if alive {
            if let Err(e) = session.tab().bring_to_front().await {
                debug!(session = %id, error = %e, "bring_to_front failed");
            }
            return Some(session);
        }

        warn!(session = %id, "Dropping session whose tab is gone or moved");
        session.mark_closed();
        self.unregister(&session).await;
        release_tab(&session).await;
        None
    }

    async fn create(&self, requested: Option<&str>) -> Result<Arc<Session>> {
        let tab = self
            .driver
            .open_tab()
            .await
            .map_err(|e| Error::SessionCreation(format!("Failed to open tab: {}", e)))?;

        let id = match self.open_conversation(tab.as_ref(), requested).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(close_err) = tab.close().await {
                    debug!(error = %close_err, "Failed to close half-built tab");
                }
                warn!(requested = ?requested, error = %e, "Session creation failed");
                return Err(Error::SessionCreation(e.to_string()));
            }
        };

        let session = Arc::new(Session::new(id.clone(), tab));
        session.mark_ready();
        let replaced = self.sessions.write().await.insert(id.clone(), session.clone());
        if let Some(old) = replaced {
            warn!(session = %id, "Replacing an existing session registered under the same id");
            old.mark_closed();
            release_tab(&old).await;
        }
        info!(session = %id, requested = ?requested, "Session ready");
        Ok(session)
    }

    /// Drive a fresh tab to a usable conversation and return its id.
    async fn open_conversation(&self, tab: &dyn Tab, requested: Option<&str>) -> Result<String> {
        let target = match requested {
            Some(id) => self.site.thread_url(id),
            None => self.site.landing_url().to_string(),
        };
        tab.navigate(&target, self.creation_timeout).await?;
        let url = tab.url().await?;

        if let Some(requested) = requested {
            if !self.site.is_landing(&url) {
                return self
                    .site
                    .thread_id(&url)
                    .ok_or_else(|| Error::SessionCreation(format!("Cannot derive chat id from {}", url)));
            }
            info!(requested = %requested, "Chat id not recognized by the site, starting a new conversation");
        }

        let new_chat = self.site.config().new_chat_button.as_str();
        tab.wait_for(new_chat, WaitCondition::Visible, self.creation_timeout).await?;
        let before = tab.url().await?;
        tab.click(new_chat).await?;
        tab.wait_for_navigation(&before, self.creation_timeout).await?;

        let url = tab.url().await?;
        self.site
            .thread_id(&url)
            .ok_or_else(|| Error::SessionCreation(format!("Cannot derive chat id from {}", url)))
    }

    async fn unregister(&self, session: &Arc<Session>) {
        let mut sessions = self.sessions.write().await;
        if sessions.get(session.id()).is_some_and(|s| Arc::ptr_eq(s, session)) {
            sessions.remove(session.id());
        }
    }
}

async fn release_tab(session: &Session) {
    if let Err(e) = session.tab().close().await {
        debug!(session = %session.id(), error = %e, "Failed to close tab");
    }
}
