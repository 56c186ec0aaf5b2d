pub mod config;
pub mod error;
pub mod paths;

pub use config::{AuthConfig, BrowserConfig, ChatConfig, Config, GatewayConfig, SiteConfig};
pub use error::{Error, Result};
pub use paths::Paths;
