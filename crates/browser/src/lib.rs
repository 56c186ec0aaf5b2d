//! Browser automation for chatbridge.
//!
//! - [`cdp`]: raw Chrome DevTools Protocol client over WebSocket
//! - [`launcher`]: discovers and spawns a Chromium-family browser
//! - [`driver`]: the [`BrowserDriver`] / [`Tab`] capability traits
//! - [`chrome`]: their implementation over CDP
//! - [`html`]: Markdown conversion for rendered content

pub mod cdp;
pub mod chrome;
pub mod driver;
pub mod html;
pub mod launcher;

pub use chrome::{ChromeDriver, ChromeTab};
pub use driver::{BrowserDriver, NetworkResponse, ResponseFilter, ResponseWatch, Tab, WaitCondition};
pub use html::html_to_markdown;
pub use launcher::{find_browser_binary, LaunchOptions};
