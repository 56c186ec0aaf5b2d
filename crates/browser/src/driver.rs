//! Capability interface between the chat orchestration and a browser.
//!
//! The chat layer only ever talks to [`BrowserDriver`] and [`Tab`]; the
//! Chrome implementation lives in [`crate::chrome`], and tests plug in an
//! in-memory fake.

use async_trait::async_trait;
use chatbridge_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// What a selector wait is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// At least one matching element is in the DOM.
    Attached,
    /// The first matching element is rendered with a non-empty box.
    Visible,
    /// The first matching element is visible and not `disabled`.
    Enabled,
    /// More than `n` matching elements are in the DOM.
    CountAbove(usize),
}

/// Which network exchange a [`ResponseWatch`] resolves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFilter {
    /// Substring the request URL must contain.
    pub url_contains: String,
    /// HTTP method, compared case-insensitively.
    pub method: String,
}

impl ResponseFilter {
    pub fn new(url_contains: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url_contains: url_contains.into(),
            method: method.into(),
        }
    }

    pub fn matches(&self, url: &str, method: &str) -> bool {
        url.contains(&self.url_contains) && method.eq_ignore_ascii_case(&self.method)
    }
}

/// A finished network exchange observed by a [`ResponseWatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// One-shot, awaitable subscription to a network response.
///
/// Armed when created, so a request fired after `observe_response` returns
/// cannot be missed. Dropping the watch cancels the subscription.
pub struct ResponseWatch {
    rx: oneshot::Receiver<Result<NetworkResponse>>,
    task: Option<JoinHandle<()>>,
}

impl ResponseWatch {
    /// Build a watch resolved through `rx`; `task` (if any) feeds the sender
    /// and is aborted when the watch goes away.
    pub fn new(rx: oneshot::Receiver<Result<NetworkResponse>>, task: Option<JoinHandle<()>>) -> Self {
        Self { rx, task }
    }

    /// Wait for the response. Consumes the watch only on resolution, so the
    /// caller may keep waiting after a timeout.
    pub async fn wait(&mut self, timeout: Duration) -> Result<NetworkResponse> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Browser(
                "network observer stopped before the response arrived".to_string(),
            )),
            Err(_) => Err(Error::Timeout(format!(
                "no matching network response within {:?}",
                timeout
            ))),
        }
    }
}

impl Drop for ResponseWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// One controllable browsing context.
#[async_trait]
pub trait Tab: Send + Sync {
    /// Driver-level identifier (CDP target id).
    fn target_id(&self) -> &str;

    /// True once the tab has been closed or its connection dropped.
    fn is_closed(&self) -> bool;

    /// Current navigation target (`location.href`).
    async fn url(&self) -> Result<String>;

    /// Navigate and wait until the page has loaded and gone network-quiet.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Wait until the URL differs from `from_url`, then for the new page to settle.
    async fn wait_for_navigation(&self, from_url: &str, timeout: Duration) -> Result<()>;

    async fn bring_to_front(&self) -> Result<()>;

    /// Poll until `selector` satisfies `condition`; `Error::Timeout` otherwise.
    async fn wait_for(&self, selector: &str, condition: WaitCondition, timeout: Duration) -> Result<()>;

    async fn count(&self, selector: &str) -> Result<usize>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Reset the value of a form control.
    async fn clear(&self, selector: &str) -> Result<()>;

    /// Focus a control and enter `text` as user input.
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// `value` of the first match, `None` if nothing matches.
    async fn value(&self, selector: &str) -> Result<Option<String>>;

    /// `textContent` of the first match, `None` if nothing matches.
    async fn text(&self, selector: &str) -> Result<Option<String>>;

    /// `innerHTML` of the last match, `None` if nothing matches.
    async fn last_inner_html(&self, selector: &str) -> Result<Option<String>>;

    /// Arm a one-shot observer for the next response matching `filter`.
    async fn observe_response(&self, filter: ResponseFilter) -> Result<ResponseWatch>;

    async fn close(&self) -> Result<()>;
}

/// The single browser instance shared by the whole process.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a fresh blank tab owned by the caller.
    async fn open_tab(&self) -> Result<Arc<dyn Tab>>;

    /// Close every tab and the browser itself.
    async fn shutdown(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_url_and_method() {
        let filter = ResponseFilter::new("/api/inference/chat", "POST");
        assert!(filter.matches("https://venice.ai/api/inference/chat?x=1", "post"));
        assert!(!filter.matches("https://venice.ai/api/inference/chat", "GET"));
        assert!(!filter.matches("https://venice.ai/api/other", "POST"));
    }

    #[tokio::test]
    async fn test_watch_resolves() {
        let (tx, rx) = oneshot::channel();
        let mut watch = ResponseWatch::new(rx, None);
        tx.send(Ok(NetworkResponse {
            url: "https://x/api".into(),
            status: 200,
            body: "ok".into(),
        }))
        .unwrap();
        let resp = watch.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(resp.body, "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_times_out_and_can_keep_waiting() {
        let (tx, rx) = oneshot::channel();
        let mut watch = ResponseWatch::new(rx, None);
        let err = watch.wait(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err.kind(), "Timeout");

        tx.send(Ok(NetworkResponse {
            url: "u".into(),
            status: 200,
            body: "late".into(),
        }))
        .unwrap();
        let resp = watch.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(resp.body, "late");
    }

    #[tokio::test]
    async fn test_watch_sender_dropped() {
        let (tx, rx) = oneshot::channel::<Result<NetworkResponse>>();
        drop(tx);
        let mut watch = ResponseWatch::new(rx, None);
        let err = watch.wait(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), "BrowserError");
    }
}
