//! In-memory [`BrowserDriver`] that imitates the chat site closely enough to
//! exercise the session and exchange logic without a browser.
//!
//! Tabs understand the default [`SiteConfig`] selectors. Submitting a prompt
//! renders `<p>Echo: {prompt}</p>` and completes the inference request after
//! [`FakeBehavior::reply_delay`]; prompts containing `[slow]` take
//! [`FakeBehavior::slow_delay`] instead.

use async_trait::async_trait;
use chatbridge_browser::{
    BrowserDriver, NetworkResponse, ResponseFilter, ResponseWatch, Tab, WaitCondition,
};
use chatbridge_core::{Error, Result, SiteConfig};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

const POLL: Duration = Duration::from_millis(50);

/// Knobs a test flips to provoke failure paths.
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    pub reply_delay: Duration,
    pub slow_delay: Duration,
    /// `open_tab` fails.
    pub fail_open_tab: bool,
    /// The landing page never shows the new-chat button.
    pub hide_new_chat_button: bool,
    /// The prompt textarea never appears.
    pub hide_prompt_input: bool,
    /// Typed text loses its last character.
    pub mangle_input: bool,
    /// The assistant renders an empty message.
    pub empty_reply: bool,
    /// When set, the inference request completes first and the message
    /// renders this much later.
    pub render_delay: Option<Duration>,
    /// The user badge shows the guest marker until sign-in completes.
    pub signed_in: bool,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            reply_delay: Duration::from_millis(50),
            slow_delay: Duration::from_secs(45),
            fail_open_tab: false,
            hide_new_chat_button: false,
            hide_prompt_input: false,
            mangle_input: false,
            empty_reply: false,
            render_delay: None,
            signed_in: true,
        }
    }
}

/// Shared state of the imaginary site.
pub struct FakeSite {
    selectors: SiteConfig,
    threads: Mutex<HashSet<String>>,
    next_thread: AtomicUsize,
    behavior: Mutex<FakeBehavior>,
    submissions: Mutex<Vec<String>>,
    opened_tabs: AtomicUsize,
    closed_tabs: AtomicUsize,
    sign_ins: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeSite {
    fn landing(&self) -> &str {
        self.selectors.chat_url.trim_end_matches('/')
    }

    fn thread_url(&self, id: &str) -> String {
        format!("{}/{}", self.landing(), id)
    }

    fn new_thread(&self) -> String {
        let id = format!("thread-{}", self.next_thread.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.threads).insert(id.clone());
        id
    }

    fn behavior(&self) -> FakeBehavior {
        lock(&self.behavior).clone()
    }
}

pub struct FakeDriver {
    site: Arc<FakeSite>,
    tabs: Mutex<Vec<Arc<FakeTab>>>,
    shut_down: AtomicBool,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            site: Arc::new(FakeSite {
                selectors: SiteConfig::default(),
                threads: Mutex::new(HashSet::new()),
                next_thread: AtomicUsize::new(0),
                behavior: Mutex::new(FakeBehavior::default()),
                submissions: Mutex::new(Vec::new()),
                opened_tabs: AtomicUsize::new(0),
                closed_tabs: AtomicUsize::new(0),
                sign_ins: AtomicUsize::new(0),
            }),
            tabs: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn configure(&self, f: impl FnOnce(&mut FakeBehavior)) {
        f(&mut lock(&self.site.behavior));
    }

    /// Make `id` an existing conversation on the site.
    pub fn add_thread(&self, id: &str) {
        lock(&self.site.threads).insert(id.to_string());
    }

    /// Prompts actually submitted, in order.
    pub fn submissions(&self) -> Vec<String> {
        lock(&self.site.submissions).clone()
    }

    pub fn opened_tabs(&self) -> usize {
        self.site.opened_tabs.load(Ordering::SeqCst)
    }

    pub fn closed_tabs(&self) -> usize {
        self.site.closed_tabs.load(Ordering::SeqCst)
    }

    pub fn sign_ins(&self) -> usize {
        self.site.sign_ins.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn tabs(&self) -> Vec<Arc<FakeTab>> {
        lock(&self.tabs).clone()
    }
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn open_tab(&self) -> Result<Arc<dyn Tab>> {
        if self.site.behavior().fail_open_tab {
            return Err(Error::Browser("cannot open tab".to_string()));
        }
        let n = self.site.opened_tabs.fetch_add(1, Ordering::SeqCst) + 1;
        let tab = Arc::new(FakeTab {
            target_id: format!("target-{}", n),
            site: self.site.clone(),
            page: Arc::new(Mutex::new(Page {
                url: "about:blank".to_string(),
                ..Page::default()
            })),
            closed: AtomicBool::new(false),
        });
        lock(&self.tabs).push(tab.clone());
        Ok(tab)
    }

    async fn shutdown(&self) -> Result<()> {
        for tab in self.tabs() {
            let _ = tab.close().await;
        }
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct Page {
    url: String,
    input: String,
    identifier: String,
    assistant: Vec<String>,
    watchers: Vec<(ResponseFilter, oneshot::Sender<Result<NetworkResponse>>)>,
}

pub struct FakeTab {
    target_id: String,
    site: Arc<FakeSite>,
    page: Arc<Mutex<Page>>,
    closed: AtomicBool,
}

impl FakeTab {
    fn page(&self) -> MutexGuard<'_, Page> {
        lock(&self.page)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Browser(format!("Target {} is closed", self.target_id)))
        } else {
            Ok(())
        }
    }

    pub fn current_url(&self) -> String {
        self.page().url.clone()
    }

    /// Simulate the site moving the tab elsewhere (e.g. a logout redirect).
    pub fn set_url(&self, url: &str) {
        self.page().url = url.to_string();
    }

    pub fn assistant_messages(&self) -> usize {
        self.page().assistant.len()
    }

    fn on_landing(&self) -> bool {
        self.page().url.trim_end_matches('/') == self.site.landing()
    }

    fn on_thread(&self) -> bool {
        self.page().url.starts_with(&format!("{}/", self.site.landing()))
    }

    fn on_sign_in(&self) -> bool {
        self.page().url == self.site.selectors.sign_in_url
    }

    fn matches(&self, selector: &str, condition: WaitCondition) -> bool {
        let s = &self.site.selectors;
        let behavior = self.site.behavior();
        let present = if selector == s.prompt_input {
            (self.on_landing() || self.on_thread()) && !behavior.hide_prompt_input
        } else if selector == s.submit_button {
            let present = self.on_landing() || self.on_thread();
            match condition {
                WaitCondition::Enabled => present && !self.page().input.is_empty(),
                _ => present,
            }
        } else if selector == s.new_chat_button {
            self.on_landing() && !behavior.hide_new_chat_button
        } else if selector == s.user_badge {
            self.on_landing() || self.on_thread()
        } else if selector == s.identifier_input || selector == s.identifier_submit {
            self.on_sign_in()
        } else if selector == s.password_input || selector == s.password_submit {
            self.on_sign_in() && !self.page().identifier.is_empty()
        } else if selector == s.assistant_message {
            !self.page().assistant.is_empty()
        } else {
            false
        };
        match condition {
            WaitCondition::CountAbove(n) if selector == s.assistant_message => {
                self.page().assistant.len() > n
            }
            WaitCondition::CountAbove(_) => false,
            _ => present,
        }
    }

    fn submit(&self) {
        let behavior = self.site.behavior();
        let (prompt, watchers) = {
            let mut page = self.page();
            let prompt = std::mem::take(&mut page.input);
            (prompt, std::mem::take(&mut page.watchers))
        };
        lock(&self.site.submissions).push(prompt.clone());

        let delay = if prompt.contains("[slow]") {
            behavior.slow_delay
        } else {
            behavior.reply_delay
        };
        let html = if behavior.empty_reply {
            "<p> </p>".to_string()
        } else {
            format!("<p>Echo: {}</p>", prompt)
        };
        let url = format!("https://venice.ai{}", self.site.selectors.inference_path);
        let page = self.page.clone();

        let render_delay = behavior.render_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if render_delay.is_none() {
                lock(&page).assistant.push(html.clone());
            }
            let body = serde_json::json!({ "prompt": prompt }).to_string();
            for (filter, tx) in watchers {
                if filter.matches(&url, "POST") {
                    let _ = tx.send(Ok(NetworkResponse {
                        url: url.clone(),
                        status: 200,
                        body: body.clone(),
                    }));
                }
            }
            if let Some(render_delay) = render_delay {
                tokio::time::sleep(render_delay).await;
                lock(&page).assistant.push(html);
            }
        });
    }
}

#[async_trait]
impl Tab for FakeTab {
    fn target_id(&self) -> &str {
        &self.target_id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn url(&self) -> Result<String> {
        self.ensure_open()?;
        Ok(self.current_url())
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        let landing = self.site.landing().to_string();
        let resolved = match url.strip_prefix(&format!("{}/", landing)) {
            Some(id) if lock(&self.site.threads).contains(id.trim_end_matches('/')) => url.to_string(),
            // Unknown conversations bounce back to the landing page.
            Some(_) => landing,
            None => url.to_string(),
        };
        let mut page = self.page();
        page.url = resolved;
        page.input.clear();
        page.assistant.clear();
        Ok(())
    }

    async fn wait_for_navigation(&self, from_url: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_open()?;
            if self.current_url() != from_url {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!("still on {}", from_url)));
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn bring_to_front(&self) -> Result<()> {
        self.ensure_open()
    }

    async fn wait_for(&self, selector: &str, condition: WaitCondition, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_open()?;
            if self.matches(selector, condition) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!("'{}' not {:?}", selector, condition)));
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        self.ensure_open()?;
        if selector == self.site.selectors.assistant_message {
            Ok(self.page().assistant.len())
        } else {
            Ok(usize::from(self.matches(selector, WaitCondition::Attached)))
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.ensure_open()?;
        if !self.matches(selector, WaitCondition::Attached) {
            return Err(Error::Browser(format!("Element not found: {}", selector)));
        }
        let s = &self.site.selectors;
        if selector == s.submit_button {
            self.submit();
        } else if selector == s.new_chat_button {
            let id = self.site.new_thread();
            self.page().url = self.site.thread_url(&id);
        } else if selector == s.password_submit {
            self.site.sign_ins.fetch_add(1, Ordering::SeqCst);
            lock(&self.site.behavior).signed_in = true;
            self.page().url = self.site.landing().to_string();
        }
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<()> {
        self.ensure_open()?;
        if selector == self.site.selectors.prompt_input {
            self.page().input.clear();
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.ensure_open()?;
        let s = &self.site.selectors;
        if selector == s.prompt_input {
            let mut typed = text.to_string();
            if self.site.behavior().mangle_input {
                typed.pop();
            }
            self.page().input.push_str(&typed);
        } else if selector == s.identifier_input {
            self.page().identifier = text.to_string();
        }
        Ok(())
    }

    async fn value(&self, selector: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        if selector == self.site.selectors.prompt_input && self.matches(selector, WaitCondition::Attached) {
            Ok(Some(self.page().input.clone()))
        } else {
            Ok(None)
        }
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        if selector == self.site.selectors.user_badge && self.matches(selector, WaitCondition::Attached) {
            let name = if self.site.behavior().signed_in {
                "Test User".to_string()
            } else {
                self.site.selectors.guest_marker.clone()
            };
            Ok(Some(name))
        } else {
            Ok(None)
        }
    }

    async fn last_inner_html(&self, selector: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        if selector == self.site.selectors.assistant_message {
            Ok(self.page().assistant.last().cloned())
        } else {
            Ok(None)
        }
    }

    async fn observe_response(&self, filter: ResponseFilter) -> Result<ResponseWatch> {
        self.ensure_open()?;
        let (tx, rx) = oneshot::channel();
        self.page().watchers.push((filter, tx));
        Ok(ResponseWatch::new(rx, None))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.site.closed_tabs.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
