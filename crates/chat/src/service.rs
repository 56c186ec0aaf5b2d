//! The chat service: the one entry point the HTTP gateway and CLI call.

use chatbridge_browser::{BrowserDriver, Tab};
use chatbridge_core::{AuthConfig, ChatConfig, Config, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::{self, LoginStatus};
use crate::extractor::{ExtractFailure, ReplyExtractor};
use crate::registry::SessionRegistry;
use crate::serializer::RequestSerializer;
use crate::session::{Session, SessionInfo};
use crate::site::SiteProfile;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub session_id: String,
    pub reply: String,
}

/// Timeouts and sweep bounds, resolved from [`ChatConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ChatTimeouts {
    pub base: Duration,
    pub extended: Duration,
    pub idle: Duration,
    pub stale_marker: Duration,
    pub sweep_interval: Duration,
}

impl From<&ChatConfig> for ChatTimeouts {
    fn from(cfg: &ChatConfig) -> Self {
        Self {
            base: Duration::from_millis(cfg.navigation_timeout_ms),
            extended: Duration::from_millis(cfg.extended_timeout_ms),
            idle: Duration::from_secs(cfg.idle_timeout_secs),
            stale_marker: Duration::from_secs(cfg.stale_marker_secs),
            sweep_interval: Duration::from_secs(cfg.sweep_interval_secs.max(1)),
        }
    }
}

pub struct ChatService {
    driver: Arc<dyn BrowserDriver>,
    site: Arc<SiteProfile>,
    auth: AuthConfig,
    timeouts: ChatTimeouts,
    registry: SessionRegistry,
    serializer: RequestSerializer<String>,
    extractor: Arc<ReplyExtractor>,
}

impl ChatService {
    pub fn new(driver: Arc<dyn BrowserDriver>, config: &Config) -> Result<Self> {
        let site = Arc::new(SiteProfile::new(config.site.clone())?);
        let timeouts = ChatTimeouts::from(&config.chat);
        Ok(Self {
            registry: SessionRegistry::new(driver.clone(), site.clone(), timeouts.extended),
            serializer: RequestSerializer::new(),
            extractor: Arc::new(ReplyExtractor::new(site.clone(), timeouts.base)),
            driver,
            site,
            auth: config.auth.clone(),
            timeouts,
        })
    }

    pub fn timeouts(&self) -> ChatTimeouts {
        self.timeouts
    }

    /// Submit `prompt` to the conversation `session_id` (or a new one) and
    /// return the reply together with the session id to use next time.
    pub async fn handle_prompt(&self, prompt: &str, session_id: Option<&str>) -> Result<ChatReply> {
        if prompt.trim().is_empty() {
            return Err(Error::Validation("No prompt provided".to_string()));
        }

        let session = self.registry.resolve(session_id).await?;
        let id = session.id().to_string();

        let producer = run_exchange(
            session,
            self.extractor.clone(),
            prompt.to_string(),
            self.timeouts.extended,
        );
        let reply = self.serializer.admit_or_join(&id, producer).await?;

        Ok(ChatReply {
            session_id: id,
            reply,
        })
    }

    /// Check the profile's login state on `tab`, signing in if needed.
    pub async fn ensure_logged_in(&self, tab: &dyn Tab) -> Result<LoginStatus> {
        auth::ensure_logged_in(tab, &self.site, &self.auth, self.timeouts.base, self.timeouts.extended).await
    }

    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.list().await
    }

    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    pub async fn close_session(&self, id: &str) -> bool {
        self.registry.close(id).await
    }

    pub fn in_flight(&self) -> usize {
        self.serializer.in_flight()
    }

    /// One maintenance pass: evict idle sessions and prune stale markers.
    pub async fn sweep(&self) -> (usize, usize) {
        let evicted = self.registry.evict_idle(self.timeouts.idle).await;
        let pruned = self.serializer.prune_stale(self.timeouts.stale_marker);
        if evicted > 0 || pruned > 0 {
            info!(evicted, pruned, "Maintenance sweep");
        }
        (evicted, pruned)
    }

    /// Run [`sweep`](Self::sweep) every `sweepIntervalSecs` until shutdown.
    pub async fn run_maintenance(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.timeouts.sweep_interval.as_secs(),
            idle_secs = self.timeouts.idle.as_secs(),
            "Session maintenance started"
        );
        let mut interval = tokio::time::interval(self.timeouts.sweep_interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    info!("Session maintenance shutting down");
                    break;
                }
            }
        }
    }

    /// Close every session, then the browser.
    pub async fn shutdown(&self) -> Result<()> {
        let closed = self.registry.close_all().await;
        info!(sessions = closed, "Closed all sessions");
        self.driver.shutdown().await
    }
}

/// Producer for one exchange: holds the session for its duration and puts it
/// back to `READY` afterwards. A `CompletionTimeout` with the inference
/// request still outstanding keeps the session `BUSY` until that request
/// finishes or `settle_timeout` elapses.
async fn run_exchange(
    session: Arc<Session>,
    extractor: Arc<ReplyExtractor>,
    prompt: String,
    settle_timeout: Duration,
) -> Result<String> {
    let turn = session.begin().await?;

    match extractor.submit_and_harvest(session.tab().as_ref(), &prompt).await {
        Ok(exchange) => {
            debug!(session = %session.id(), raw_bytes = exchange.raw_signal.len(), "Exchange complete");
            turn.complete();
            Ok(exchange.reply)
        }
        Err(ExtractFailure {
            error,
            pending: Some(mut signal),
        }) => {
            warn!(session = %session.id(), error = %error, "Exchange timed out, settling in background");
            let id = session.id().to_string();
            tokio::spawn(async move {
                match signal.wait(settle_timeout).await {
                    Ok(_) => {
                        info!(session = %id, "Late completion signal arrived");
                        turn.complete();
                    }
                    Err(e) => {
                        warn!(session = %id, error = %e, "Session did not settle");
                        drop(turn);
                    }
                }
            });
            Err(error)
        }
        Err(ExtractFailure { error, pending: None }) => {
            warn!(session = %session.id(), error = %error, "Exchange failed");
            drop(turn);
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::testing::FakeDriver;
    use futures::future::join_all;

    fn service() -> (Arc<FakeDriver>, Arc<ChatService>) {
        let driver = Arc::new(FakeDriver::new());
        let service = ChatService::new(driver.clone(), &Config::default()).unwrap();
        (driver, Arc::new(service))
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_prompt_rejected_without_browser() {
        let (driver, service) = service();
        for prompt in ["", "   ", "\n\t"] {
            let err = service.handle_prompt(prompt, None).await.unwrap_err();
            assert_eq!(err, Error::Validation("No prompt provided".into()));
        }
        assert_eq!(driver.opened_tabs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_session() {
        let (_driver, service) = service();
        let reply = service.handle_prompt("Hello", None).await.unwrap();
        assert!(!reply.session_id.is_empty());
        assert_eq!(reply.reply, "Echo: Hello");

        let sessions = service.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].chat_id, reply.session_id);
        assert_eq!(sessions[0].state, SessionState::Ready);

        let next = service.handle_prompt("Again", Some(reply.session_id.as_str())).await.unwrap();
        assert_eq!(next.session_id, reply.session_id);
        assert_eq!(next.reply, "Echo: Again");
        assert_eq!(service.session_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_same_session_single_exchange() {
        let (driver, service) = service();
        let first = service.handle_prompt("warm up", None).await.unwrap();
        let id = first.session_id.clone();

        let calls = (0..5).map(|_| service.handle_prompt("Hello", Some(id.as_str())));
        let replies = join_all(calls).await;

        assert_eq!(driver.submissions(), vec!["warm up".to_string(), "Hello".to_string()]);
        for reply in replies {
            let reply = reply.unwrap();
            assert_eq!(reply.session_id, id);
            assert_eq!(reply.reply, "Echo: Hello");
        }
        assert_eq!(service.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failure_is_shared() {
        let (driver, service) = service();
        let id = service.handle_prompt("warm up", None).await.unwrap().session_id;
        driver.configure(|b| b.mangle_input = true);

        let replies = join_all((0..3).map(|_| service.handle_prompt("Hello", Some(id.as_str())))).await;
        for reply in replies {
            assert_eq!(reply.unwrap_err().kind(), "InputMismatch");
        }
        assert_eq!(driver.submissions().len(), 1);

        let session = service.registry.get(&id).await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_timeout_isolated_and_settles() {
        let (_driver, service) = service();
        let a = service.handle_prompt("start a", None).await.unwrap().session_id;
        let b = service.handle_prompt("start b", None).await.unwrap().session_id;
        assert_ne!(a, b);

        let slow = {
            let service = service.clone();
            let a = a.clone();
            tokio::spawn(async move { service.handle_prompt("[slow] a", Some(a.as_str())).await })
        };
        let fast = service.handle_prompt("quick b", Some(b.as_str())).await.unwrap();
        assert_eq!(fast.reply, "Echo: quick b");
        assert!(!slow.is_finished());

        let err = slow.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), "CompletionTimeout");

        let session_a = service.registry.get(&a).await.unwrap();
        assert_eq!(session_a.state(), SessionState::Busy);

        // The slow reply lands at 45s; the base timeout fired at 30s.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(session_a.state(), SessionState::Ready);

        let again = service.handle_prompt("after", Some(a.as_str())).await.unwrap();
        assert_eq!(again.session_id, a);
        assert_eq!(again.reply, "Echo: after");
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_during_settle_waits_for_session() {
        let (driver, service) = service();
        let a = service.handle_prompt("start", None).await.unwrap().session_id;
        let err = service.handle_prompt("[slow] a", Some(a.as_str())).await.unwrap_err();
        assert_eq!(err.kind(), "CompletionTimeout");

        let next = service.handle_prompt("next", Some(a.as_str())).await.unwrap();
        assert_eq!(next.reply, "Echo: next");
        assert_eq!(
            driver.submissions(),
            vec!["start".to_string(), "[slow] a".to_string(), "next".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_and_id_recreates() {
        let (driver, service) = service();
        let id = service.handle_prompt("hi", None).await.unwrap().session_id;

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(service.sweep().await, (1, 0));
        assert_eq!(service.session_count().await, 0);

        let reply = service.handle_prompt("back", Some(id.as_str())).await.unwrap();
        assert_eq!(reply.session_id, id);
        assert_eq!(driver.opened_tabs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_loop_stops_on_shutdown() {
        let (_driver, service) = service();
        service.handle_prompt("hi", None).await.unwrap();

        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(service.clone().run_maintenance(rx));

        tokio::time::sleep(Duration::from_secs(400)).await;
        assert_eq!(service.session_count().await, 0);

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_everything() {
        let (driver, service) = service();
        service.handle_prompt("a", None).await.unwrap();
        service.handle_prompt("b", None).await.unwrap();
        assert!(service.close_session("thread-1").await);
        assert!(!service.close_session("thread-1").await);

        service.shutdown().await.unwrap();
        assert_eq!(service.session_count().await, 0);
        assert!(driver.is_shut_down());
        assert!(driver.tabs().iter().all(|t| t.is_closed()));
    }
}
