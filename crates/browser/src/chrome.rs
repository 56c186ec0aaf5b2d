//! [`BrowserDriver`] / [`Tab`] over a locally launched Chromium-family browser.

use async_trait::async_trait;
use chatbridge_core::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cdp::CdpClient;
use crate::driver::{BrowserDriver, NetworkResponse, ResponseFilter, ResponseWatch, Tab, WaitCondition};
use crate::launcher::{self, LaunchOptions};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const NETWORK_QUIET: Duration = Duration::from_millis(500);
/// "Idle" tolerates this many open requests (long-polls, analytics beacons).
const NETWORK_IDLE_MAX_INFLIGHT: usize = 2;

pub struct ChromeDriver {
    browser: CdpClient,
    debug_port: u16,
    process: Mutex<Option<Child>>,
    command_timeout: Duration,
}

impl ChromeDriver {
    /// Launch the browser and connect to its browser-level endpoint.
    pub async fn launch(opts: &LaunchOptions, command_timeout: Duration) -> Result<Self> {
        let launched = launcher::launch(opts).await?;
        let browser = CdpClient::connect(&launched.browser_ws_url, command_timeout).await?;
        info!(port = launched.debug_port, "Browser launched successfully");
        Ok(Self {
            browser,
            debug_port: launched.debug_port,
            process: Mutex::new(Some(launched.process)),
            command_timeout,
        })
    }

    /// Close every page target except `keep` (tabs restored from the profile).
    pub async fn close_other_tabs(&self, keep: &str) -> Result<usize> {
        let targets = self.browser.get_targets().await?;
        let mut closed = 0;
        for target in targets {
            if target.get("type").and_then(|v| v.as_str()) != Some("page") {
                continue;
            }
            let Some(id) = target.get("targetId").and_then(|v| v.as_str()) else {
                continue;
            };
            if id == keep {
                continue;
            }
            match self.browser.close_target(id).await {
                Ok(()) => closed += 1,
                Err(e) => warn!(target = id, error = %e, "Failed to close stray tab"),
            }
        }
        Ok(closed)
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn open_tab(&self) -> Result<Arc<dyn Tab>> {
        let target_id = self.browser.create_target("about:blank").await?;
        let ws_url = launcher::get_target_ws_url(self.debug_port, &target_id).await?;
        let cdp = CdpClient::connect(&ws_url, self.command_timeout).await?;

        for domain in ["Page", "Runtime", "DOM", "Network"] {
            cdp.enable_domain(domain).await?;
        }

        debug!(target = %target_id, "Opened tab");
        Ok(Arc::new(ChromeTab {
            target_id,
            cdp: Arc::new(cdp),
            closed: AtomicBool::new(false),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        if let Err(e) = self.browser.send_command("Browser.close", json!({})).await {
            debug!("CDP Browser.close failed (may already be closed): {}", e);
        }
        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.kill().await;
        }
        info!("Browser closed");
        Ok(())
    }
}

pub struct ChromeTab {
    target_id: String,
    cdp: Arc<CdpClient>,
    closed: AtomicBool,
}

impl ChromeTab {
    async fn eval_str(&self, expression: &str) -> Result<Option<String>> {
        let value = self.cdp.evaluate_js(expression).await?;
        Ok(value.as_str().map(|s| s.to_string()))
    }
}

#[async_trait]
impl Tab for ChromeTab {
    fn target_id(&self) -> &str {
        &self.target_id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.cdp.is_closed()
    }

    async fn url(&self) -> Result<String> {
        self.eval_str("window.location.href")
            .await?
            .ok_or_else(|| Error::Browser("location.href is not a string".to_string()))
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut load = self.cdp.subscribe_event("Page.loadEventFired").await;
        let mut network = NetworkEvents::subscribe(&self.cdp).await;
        let mut idle = NetworkIdle::new(Instant::now());
        self.cdp.navigate(url).await?;

        loop {
            tokio::select! {
                biased;
                loaded = load.recv() => match loaded {
                    Some(_) => break,
                    None => return Err(Error::Browser(format!("Tab closed while loading {}", url))),
                },
                Some(event) = network.next_request_event() => idle.apply(event, Instant::now()),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(Error::Timeout(format!(
                        "Navigation to {} did not load within {:?}",
                        url, timeout
                    )))
                }
            }
        }

        if !settle_network(&mut network, &mut idle, deadline).await {
            debug!(url, inflight = idle.inflight(), "Network did not go idle before deadline");
        }
        Ok(())
    }

    async fn wait_for_navigation(&self, from_url: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut network = NetworkEvents::subscribe(&self.cdp).await;
        let mut idle = NetworkIdle::new(Instant::now());
        loop {
            // The execution context is briefly gone mid-navigation; keep polling.
            if let Ok(current) = self.url().await {
                if current != from_url {
                    break;
                }
            }
            if self.is_closed() {
                return Err(Error::Browser("Tab closed while waiting for navigation".to_string()));
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "No navigation away from {} within {:?}",
                    from_url, timeout
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            while let Some(event) = network.try_next_request_event() {
                idle.apply(event, Instant::now());
            }
        }
        if !settle_network(&mut network, &mut idle, deadline).await {
            debug!(from_url, inflight = idle.inflight(), "Network did not go idle before deadline");
        }
        Ok(())
    }

    async fn bring_to_front(&self) -> Result<()> {
        self.cdp.send_command("Page.bringToFront", json!({})).await?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, condition: WaitCondition, timeout: Duration) -> Result<()> {
        let script = condition_script(selector, condition);
        let deadline = Instant::now() + timeout;
        loop {
            match self.cdp.evaluate_js(&script).await {
                Ok(Value::Bool(true)) => return Ok(()),
                Ok(_) => {}
                Err(e) if self.is_closed() => return Err(e),
                Err(e) => debug!(selector, error = %e, "Selector probe failed, retrying"),
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "'{}' not {:?} within {:?}",
                    selector, condition, timeout
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let script = format!("document.querySelectorAll({}).length", js_str(selector));
        let value = self.cdp.evaluate_js(&script).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let script = format!(
            concat!(
                "(function() {{ var el = document.querySelector({});",
                " if (!el) return false;",
                " el.scrollIntoView({{block: 'center'}});",
                " el.click(); return true; }})()"
            ),
            js_str(selector)
        );
        match self.cdp.evaluate_js(&script).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(Error::Browser(format!("Element not found: {}", selector))),
        }
    }

    async fn clear(&self, selector: &str) -> Result<()> {
        let script = format!(
            concat!(
                "(function() {{ var el = document.querySelector({});",
                " if (!el) return false;",
                " el.value = '';",
                " el.dispatchEvent(new Event('input', {{bubbles: true}}));",
                " return true; }})()"
            ),
            js_str(selector)
        );
        match self.cdp.evaluate_js(&script).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(Error::Browser(format!("Element not found: {}", selector))),
        }
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let focus = format!(
            "(function() {{ var el = document.querySelector({}); if (!el) return false; el.focus(); return true; }})()",
            js_str(selector)
        );
        match self.cdp.evaluate_js(&focus).await? {
            Value::Bool(true) => {}
            _ => return Err(Error::Browser(format!("Element not found: {}", selector))),
        }
        self.cdp.insert_text(text).await
    }

    async fn value(&self, selector: &str) -> Result<Option<String>> {
        let script = format!(
            "(function() {{ var el = document.querySelector({}); return el ? String(el.value) : null; }})()",
            js_str(selector)
        );
        self.eval_str(&script).await
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        let script = format!(
            "(function() {{ var el = document.querySelector({}); return el ? el.textContent : null; }})()",
            js_str(selector)
        );
        self.eval_str(&script).await
    }

    async fn last_inner_html(&self, selector: &str) -> Result<Option<String>> {
        let script = format!(
            concat!(
                "(function() {{ var els = document.querySelectorAll({});",
                " if (els.length === 0) return null;",
                " return els[els.length - 1].innerHTML; }})()"
            ),
            js_str(selector)
        );
        self.eval_str(&script).await
    }

    async fn observe_response(&self, filter: ResponseFilter) -> Result<ResponseWatch> {
        let events = NetworkEvents::subscribe(&self.cdp).await;
        let cdp = self.cdp.clone();
        let (tx, rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let outcome = watch_response(events, filter, |id| {
                let cdp = cdp.clone();
                async move { cdp.get_response_body(&id).await }
            })
            .await;
            let _ = tx.send(outcome);
        });

        Ok(ResponseWatch::new(rx, Some(task)))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.cdp.send_command("Page.close", json!({})).await {
            debug!(target = %self.target_id, "Page.close failed (may already be closed): {}", e);
        }
        Ok(())
    }
}

/// Request lifecycle subscriptions of one tab. Open them before the action
/// whose traffic should be seen.
struct NetworkEvents {
    sent: mpsc::Receiver<Value>,
    received: mpsc::Receiver<Value>,
    finished: mpsc::Receiver<Value>,
    failed: mpsc::Receiver<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RequestEvent {
    Started(String),
    Ended(String),
}

impl NetworkEvents {
    async fn subscribe(cdp: &CdpClient) -> Self {
        Self {
            sent: cdp.subscribe_event("Network.requestWillBeSent").await,
            received: cdp.subscribe_event("Network.responseReceived").await,
            finished: cdp.subscribe_event("Network.loadingFinished").await,
            failed: cdp.subscribe_event("Network.loadingFailed").await,
        }
    }

    /// A request event that has already arrived, without waiting.
    fn try_next_request_event(&mut self) -> Option<RequestEvent> {
        loop {
            let event = if let Ok(ev) = self.sent.try_recv() {
                request_id(&ev).map(RequestEvent::Started)
            } else if let Ok(ev) = self.finished.try_recv() {
                request_id(&ev).map(RequestEvent::Ended)
            } else if let Ok(ev) = self.failed.try_recv() {
                request_id(&ev).map(RequestEvent::Ended)
            } else {
                return None;
            };
            if event.is_some() {
                return event;
            }
        }
    }

    /// Next request start or end. Starts are drained first, so a request is
    /// always seen starting before it ends. `None` once the tab is gone.
    async fn next_request_event(&mut self) -> Option<RequestEvent> {
        loop {
            tokio::select! {
                biased;
                Some(ev) = self.sent.recv() => {
                    if let Some(id) = request_id(&ev) {
                        return Some(RequestEvent::Started(id));
                    }
                }
                Some(ev) = self.finished.recv() => {
                    if let Some(id) = request_id(&ev) {
                        return Some(RequestEvent::Ended(id));
                    }
                }
                Some(ev) = self.failed.recv() => {
                    if let Some(id) = request_id(&ev) {
                        return Some(RequestEvent::Ended(id));
                    }
                }
                else => return None,
            }
        }
    }
}

/// "Network idle": at most [`NETWORK_IDLE_MAX_INFLIGHT`] open requests for
/// [`NETWORK_QUIET`]. Traffic under the limit does not restart the window.
#[derive(Debug)]
struct NetworkIdle {
    inflight: HashSet<String>,
    quiet_since: Option<Instant>,
}

impl NetworkIdle {
    fn new(now: Instant) -> Self {
        Self {
            inflight: HashSet::new(),
            quiet_since: Some(now),
        }
    }

    fn apply(&mut self, event: RequestEvent, now: Instant) {
        match event {
            RequestEvent::Started(id) => {
                self.inflight.insert(id);
                if self.inflight.len() > NETWORK_IDLE_MAX_INFLIGHT {
                    self.quiet_since = None;
                }
            }
            RequestEvent::Ended(id) => {
                self.inflight.remove(&id);
                if self.quiet_since.is_none() && self.inflight.len() <= NETWORK_IDLE_MAX_INFLIGHT {
                    self.quiet_since = Some(now);
                }
            }
        }
    }

    fn inflight(&self) -> usize {
        self.inflight.len()
    }

    /// When the page counts as idle if the request count stays low.
    fn idle_at(&self) -> Option<Instant> {
        self.quiet_since.map(|since| since + NETWORK_QUIET)
    }
}

/// Wait until `idle` reports the page quiet. Pages with long-lived
/// connections may never get there; returns false at `deadline`.
async fn settle_network(events: &mut NetworkEvents, idle: &mut NetworkIdle, deadline: Instant) -> bool {
    loop {
        let idle_at = idle.idle_at();
        tokio::select! {
            biased;
            Some(event) = events.next_request_event() => idle.apply(event, Instant::now()),
            _ = tokio::time::sleep_until(idle_at.unwrap_or(deadline)), if idle_at.is_some() => return true,
            _ = tokio::time::sleep_until(deadline) => return false,
        }
    }
}

/// Resolve with the first request matching `filter` once its body is read.
async fn watch_response<F, Fut>(
    mut events: NetworkEvents,
    filter: ResponseFilter,
    fetch_body: F,
) -> Result<NetworkResponse>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let mut target: Option<(String, String)> = None;
    let mut status: u16 = 0;
    loop {
        // Arms follow the order the browser emits the events in, so a finish
        // is never looked at before the start of the same request.
        tokio::select! {
            biased;
            Some(ev) = events.sent.recv() => {
                if target.is_some() {
                    continue;
                }
                let url = ev.pointer("/request/url").and_then(|v| v.as_str()).unwrap_or_default();
                let method = ev.pointer("/request/method").and_then(|v| v.as_str()).unwrap_or_default();
                if filter.matches(url, method) {
                    if let Some(id) = request_id(&ev) {
                        debug!(url, request_id = %id, "Observed matching request");
                        target = Some((id, url.to_string()));
                    }
                }
            }
            Some(ev) = events.received.recv() => {
                if is_target(&target, &ev) {
                    status = ev.pointer("/response/status").and_then(|v| v.as_u64()).unwrap_or(0) as u16;
                }
            }
            Some(ev) = events.finished.recv() => {
                if let Some((id, url)) = target.as_ref().filter(|_| is_target(&target, &ev)) {
                    let body = fetch_body(id.clone()).await?;
                    return Ok(NetworkResponse {
                        url: url.clone(),
                        status,
                        body,
                    });
                }
            }
            Some(ev) = events.failed.recv() => {
                if is_target(&target, &ev) {
                    let reason = ev.get("errorText").and_then(|v| v.as_str()).unwrap_or("unknown");
                    return Err(Error::Browser(format!("Observed request failed: {}", reason)));
                }
            }
            else => return Err(Error::Browser("Tab connection closed".to_string())),
        }
    }
}

fn request_id(event: &Value) -> Option<String> {
    event.get("requestId").and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn is_target(target: &Option<(String, String)>, event: &Value) -> bool {
    match (target, event.get("requestId").and_then(|v| v.as_str())) {
        (Some((id, _)), Some(ev_id)) => id == ev_id,
        _ => false,
    }
}

/// Quote `s` as a JavaScript string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn condition_script(selector: &str, condition: WaitCondition) -> String {
    let sel = js_str(selector);
    match condition {
        WaitCondition::Attached => format!("document.querySelector({}) !== null", sel),
        WaitCondition::Visible => format!(
            concat!(
                "(function() {{ var el = document.querySelector({});",
                " if (!el) return false;",
                " var r = el.getBoundingClientRect(); var s = window.getComputedStyle(el);",
                " return r.width > 0 && r.height > 0 && s.visibility !== 'hidden'; }})()"
            ),
            sel
        ),
        WaitCondition::Enabled => format!(
            concat!(
                "(function() {{ var el = document.querySelector({});",
                " if (!el || el.disabled) return false;",
                " var r = el.getBoundingClientRect(); var s = window.getComputedStyle(el);",
                " return r.width > 0 && r.height > 0 && s.visibility !== 'hidden'; }})()"
            ),
            sel
        ),
        WaitCondition::CountAbove(n) => {
            format!("document.querySelectorAll({}).length > {}", sel, n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_str_escapes_quotes() {
        let quoted = js_str(r#"textarea[placeholder="Ask a question..."]"#);
        assert_eq!(quoted, r#""textarea[placeholder=\"Ask a question...\"]""#);
    }

    #[test]
    fn test_condition_scripts() {
        let s = condition_script(".assistant", WaitCondition::CountAbove(3));
        assert_eq!(s, r#"document.querySelectorAll(".assistant").length > 3"#);
        assert!(condition_script("button", WaitCondition::Enabled).contains("el.disabled"));
        assert!(condition_script("#x", WaitCondition::Attached).contains("!== null"));
    }

    struct NetworkFeed {
        sent: mpsc::Sender<Value>,
        received: mpsc::Sender<Value>,
        finished: mpsc::Sender<Value>,
        failed: mpsc::Sender<Value>,
    }

    fn network_feed() -> (NetworkFeed, NetworkEvents) {
        let (sent_tx, sent) = mpsc::channel(64);
        let (received_tx, received) = mpsc::channel(64);
        let (finished_tx, finished) = mpsc::channel(64);
        let (failed_tx, failed) = mpsc::channel(64);
        (
            NetworkFeed {
                sent: sent_tx,
                received: received_tx,
                finished: finished_tx,
                failed: failed_tx,
            },
            NetworkEvents {
                sent,
                received,
                finished,
                failed,
            },
        )
    }

    #[tokio::test]
    async fn test_network_idle_rule() {
        let t0 = Instant::now();
        let mut idle = NetworkIdle::new(t0);
        idle.apply(RequestEvent::Started("1".into()), t0);
        idle.apply(RequestEvent::Started("2".into()), t0);
        assert_eq!(idle.idle_at(), Some(t0 + NETWORK_QUIET));

        idle.apply(RequestEvent::Started("3".into()), t0);
        assert_eq!(idle.idle_at(), None);

        let t1 = t0 + Duration::from_secs(1);
        idle.apply(RequestEvent::Ended("3".into()), t1);
        assert_eq!(idle.idle_at(), Some(t1 + NETWORK_QUIET));

        // Finishing more requests while already under the limit keeps the window.
        idle.apply(RequestEvent::Ended("1".into()), t1 + Duration::from_millis(200));
        assert_eq!(idle.idle_at(), Some(t1 + NETWORK_QUIET));
        assert_eq!(idle.inflight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_beacon_does_not_block_idle() {
        let (feed, mut events) = network_feed();
        let start = Instant::now();
        let mut idle = NetworkIdle::new(start);

        let beacons = tokio::spawn(async move {
            for n in 0..50 {
                let id = format!("beacon-{}", n);
                let _ = feed.sent.send(json!({ "requestId": &id })).await;
                tokio::time::sleep(Duration::from_millis(100)).await;
                let _ = feed.finished.send(json!({ "requestId": &id })).await;
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
        });

        let settled = settle_network(&mut events, &mut idle, start + Duration::from_secs(120)).await;
        assert!(settled);
        assert!(start.elapsed() < Duration::from_secs(1));
        beacons.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_open_before_settling_are_counted() {
        let (feed, mut events) = network_feed();
        let start = Instant::now();
        let mut idle = NetworkIdle::new(start);
        for id in ["a", "b", "c"] {
            feed.sent.send(json!({ "requestId": id })).await.unwrap();
        }

        let finisher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            feed.failed.send(json!({ "requestId": "b" })).await.unwrap();
            feed
        });

        let settled = settle_network(&mut events, &mut idle, start + Duration::from_secs(120)).await;
        assert!(settled);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2500), "settled after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3), "settled after {:?}", elapsed);
        drop(finisher);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_network_gives_up_at_deadline() {
        let (feed, mut events) = network_feed();
        let start = Instant::now();
        let mut idle = NetworkIdle::new(start);
        for id in ["a", "b", "c"] {
            feed.sent.send(json!({ "requestId": id })).await.unwrap();
        }

        let settled = settle_network(&mut events, &mut idle, start + Duration::from_secs(5)).await;
        assert!(!settled);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
        assert_eq!(idle.inflight(), 3);
        drop(feed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_response_handles_start_before_finish() {
        let (feed, events) = network_feed();
        let filter = ResponseFilter::new("/api/inference/chat", "POST");

        // Everything is already queued when the watcher first runs.
        feed.finished.send(json!({ "requestId": "7" })).await.unwrap();
        feed.received
            .send(json!({ "requestId": "7", "response": { "status": 200 } }))
            .await
            .unwrap();
        feed.sent
            .send(json!({ "requestId": "6", "request": { "url": "https://venice.ai/api/user", "method": "GET" } }))
            .await
            .unwrap();
        feed.sent
            .send(json!({
                "requestId": "7",
                "request": { "url": "https://venice.ai/api/inference/chat", "method": "POST" }
            }))
            .await
            .unwrap();

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            watch_response(events, filter, |id| async move { Ok(format!("body of {}", id)) }),
        )
        .await
        .expect("watcher resolved")
        .unwrap();

        assert_eq!(response.url, "https://venice.ai/api/inference/chat");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "body of 7");
        drop(feed);
    }

    #[tokio::test]
    async fn test_watch_response_reports_failed_request() {
        let (feed, events) = network_feed();
        let filter = ResponseFilter::new("/api/inference/chat", "POST");
        feed.sent
            .send(json!({
                "requestId": "9",
                "request": { "url": "https://venice.ai/api/inference/chat", "method": "POST" }
            }))
            .await
            .unwrap();
        feed.failed
            .send(json!({ "requestId": "9", "errorText": "net::ERR_ABORTED" }))
            .await
            .unwrap();

        let err = watch_response(events, filter, |_| async { Ok(String::new()) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ERR_ABORTED"));
        drop(feed);
    }

    #[test]
    fn test_is_target() {
        let target = Some(("42.1".to_string(), "https://x/api".to_string()));
        assert!(is_target(&target, &json!({"requestId": "42.1"})));
        assert!(!is_target(&target, &json!({"requestId": "42.2"})));
        assert!(!is_target(&None, &json!({"requestId": "42.1"})));
    }
}
