use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// When set, every route except `/health` requires this Bearer token.
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_gateway_host() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    #[serde(default)]
    pub headless: bool,
    /// Overrides browser discovery.
    #[serde(default)]
    pub executable_path: Option<String>,
    /// Profile directory; defaults to `Paths::chrome_data_dir`.
    #[serde(default)]
    pub user_data_dir: Option<String>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    /// Upper bound for a single DevTools command round-trip.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// How long to wait for the DevTools endpoint after spawning the browser.
    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,
}

fn default_window_width() -> u32 {
    800
}

fn default_window_height() -> u32 {
    600
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

fn default_launch_timeout_secs() -> u64 {
    15
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            executable_path: None,
            user_data_dir: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
            command_timeout_ms: default_command_timeout_ms(),
            launch_timeout_secs: default_launch_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Base timeout for page-local waits (input, submit, completion signals).
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    /// Timeout for session creation, navigation and post-timeout settling.
    #[serde(default = "default_extended_timeout_ms")]
    pub extended_timeout_ms: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_stale_marker_secs")]
    pub stale_marker_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_extended_timeout_ms() -> u64 {
    120_000
}

fn default_idle_timeout_secs() -> u64 {
    5 * 60
}

fn default_stale_marker_secs() -> u64 {
    5 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: default_navigation_timeout_ms(),
            extended_timeout_ms: default_extended_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            stale_marker_secs: default_stale_marker_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl AuthConfig {
    /// Both halves of the credential pair, if configured and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let email = self.email.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let password = self.password.as_deref().filter(|s| !s.is_empty())?;
        Some((email, password))
    }
}

/// URLs and selectors of the target chat application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    #[serde(default = "default_chat_url")]
    pub chat_url: String,
    #[serde(default = "default_sign_in_url")]
    pub sign_in_url: String,
    #[serde(default = "default_inference_path")]
    pub inference_path: String,
    #[serde(default = "default_inference_method")]
    pub inference_method: String,
    #[serde(default = "default_prompt_input")]
    pub prompt_input: String,
    #[serde(default = "default_submit_button")]
    pub submit_button: String,
    #[serde(default = "default_assistant_message")]
    pub assistant_message: String,
    #[serde(default = "default_new_chat_button")]
    pub new_chat_button: String,
    #[serde(default = "default_user_badge")]
    pub user_badge: String,
    #[serde(default = "default_guest_marker")]
    pub guest_marker: String,
    #[serde(default = "default_identifier_input")]
    pub identifier_input: String,
    #[serde(default = "default_identifier_submit")]
    pub identifier_submit: String,
    #[serde(default = "default_password_input")]
    pub password_input: String,
    #[serde(default = "default_password_submit")]
    pub password_submit: String,
}

fn default_chat_url() -> String {
    "https://venice.ai/chat".to_string()
}

fn default_sign_in_url() -> String {
    "https://venice.ai/sign-in".to_string()
}

fn default_inference_path() -> String {
    "/api/inference/chat".to_string()
}

fn default_inference_method() -> String {
    "POST".to_string()
}

fn default_prompt_input() -> String {
    r#"textarea[placeholder="Ask a question..."]"#.to_string()
}

fn default_submit_button() -> String {
    r#"button[data-testid="chatInputSubmitButton"]"#.to_string()
}

fn default_assistant_message() -> String {
    ".assistant".to_string()
}

fn default_new_chat_button() -> String {
    "body > div.css-wi1irr > div.css-6o8pp7 > div.css-135z2h5 > div > div > button:nth-child(1)"
        .to_string()
}

fn default_user_badge() -> String {
    "body > div.css-wi1irr > div.css-6o8pp7 > div.css-e8h8zp > div > div.css-oc1j8r > button.chakra-button.css-1rz9yxu > div > div > div > p"
        .to_string()
}

fn default_guest_marker() -> String {
    "Venice Guest".to_string()
}

fn default_identifier_input() -> String {
    "#identifier".to_string()
}

fn default_identifier_submit() -> String {
    "body > div.chakra-stack.css-165casq > div > div > div > div > div.chakra-card__body.css-2f8ovt > form > div > div.css-8atqhb > button"
        .to_string()
}

fn default_password_input() -> String {
    "#password".to_string()
}

fn default_password_submit() -> String {
    "body > div.chakra-stack.css-165casq > div > div > div > div > div.chakra-card__body.css-2f8ovt > form > button"
        .to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            chat_url: default_chat_url(),
            sign_in_url: default_sign_in_url(),
            inference_path: default_inference_path(),
            inference_method: default_inference_method(),
            prompt_input: default_prompt_input(),
            submit_button: default_submit_button(),
            assistant_message: default_assistant_message(),
            new_chat_button: default_new_chat_button(),
            user_badge: default_user_badge(),
            guest_marker: default_guest_marker(),
            identifier_input: default_identifier_input(),
            identifier_submit: default_identifier_submit(),
            password_input: default_password_input(),
            password_submit: default_password_submit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load the config file, then layer the process environment on top.
    pub fn load_with_env(paths: &Paths) -> Result<Self> {
        let mut config = Self::load_or_default(paths)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply the environment variables the service has always honoured
    /// (`PORT`, `HEADLESS`, `MAX_TIMEOUT`, `EXECUTABLE_PATH`, `LOGIN_*`, ...).
    ///
    /// `EXECUTABLE_PATH` is honoured on every platform, not only Windows, and
    /// wins over both `browser.executablePath` and auto-discovery.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST").filter(|s| !s.trim().is_empty()) {
            self.gateway.host = host.trim().to_string();
        }
        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.gateway.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid PORT"),
            }
        }
        if let Some(token) = lookup("CHATBRIDGE_API_TOKEN").filter(|s| !s.trim().is_empty()) {
            self.gateway.api_token = Some(token.trim().to_string());
        }
        if let Some(headless) = lookup("HEADLESS") {
            self.browser.headless = headless.trim().eq_ignore_ascii_case("true");
        }
        if let Some(path) = lookup("EXECUTABLE_PATH").filter(|s| !s.trim().is_empty()) {
            self.browser.executable_path = Some(path.trim().to_string());
        }
        if let Some(timeout) = lookup("MAX_TIMEOUT") {
            match timeout.trim().parse::<u64>() {
                Ok(ms) => self.chat.navigation_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring invalid MAX_TIMEOUT"),
            }
        }
        if let Some(email) = lookup("LOGIN_EMAIL").filter(|s| !s.is_empty()) {
            self.auth.email = Some(email);
        }
        if let Some(password) = lookup("LOGIN_PASSWORD").filter(|s| !s.is_empty()) {
            self.auth.password = Some(password);
        }
    }

    /// Profile directory, falling back to the one under `paths`.
    pub fn user_data_dir(&self, paths: &Paths) -> PathBuf {
        match self.browser.user_data_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => paths.chrome_data_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_json() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.gateway.port, 3000);
        assert_eq!(cfg.chat.navigation_timeout_ms, 30_000);
        assert_eq!(cfg.chat.extended_timeout_ms, 120_000);
        assert_eq!(cfg.chat.stale_marker_secs, 300);
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.site.inference_path, "/api/inference/chat");
        assert!(cfg.auth.credentials().is_none());
    }

    #[test]
    fn test_partial_sections() {
        let raw = r#"{
  "chat": { "idleTimeoutSecs": 60 },
  "site": { "chatUrl": "http://localhost:8080/chat" }
}"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.chat.idle_timeout_secs, 60);
        assert_eq!(cfg.chat.navigation_timeout_ms, 30_000);
        assert_eq!(cfg.site.chat_url, "http://localhost:8080/chat");
        assert_eq!(cfg.site.assistant_message, ".assistant");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8081"),
            ("HEADLESS", "true"),
            ("MAX_TIMEOUT", "45000"),
            ("EXECUTABLE_PATH", "/opt/chrome/chrome"),
            ("LOGIN_EMAIL", "me@example.com"),
            ("LOGIN_PASSWORD", "hunter2"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.gateway.port, 8081);
        assert!(cfg.browser.headless);
        assert_eq!(cfg.chat.navigation_timeout_ms, 45_000);
        assert_eq!(cfg.browser.executable_path.as_deref(), Some("/opt/chrome/chrome"));
        assert_eq!(cfg.auth.credentials(), Some(("me@example.com", "hunter2")));
    }

    #[test]
    fn test_executable_path_env_beats_config_file() {
        let mut cfg = Config::default();
        cfg.browser.executable_path = Some("/usr/bin/chromium".to_string());

        cfg.apply_env(|k| (k == "EXECUTABLE_PATH").then(|| "  /opt/edge/msedge ".to_string()));
        assert_eq!(cfg.browser.executable_path.as_deref(), Some("/opt/edge/msedge"));

        cfg.apply_env(|k| (k == "EXECUTABLE_PATH").then(|| "   ".to_string()));
        assert_eq!(cfg.browser.executable_path.as_deref(), Some("/opt/edge/msedge"));
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut cfg = Config::default();
        cfg.apply_env(|k| match k {
            "PORT" => Some("not-a-port".to_string()),
            "MAX_TIMEOUT" => Some("soon".to_string()),
            "HEADLESS" => Some("no".to_string()),
            _ => None,
        });
        assert_eq!(cfg.gateway.port, 3000);
        assert_eq!(cfg.chat.navigation_timeout_ms, 30_000);
        assert!(!cfg.browser.headless);
    }

    #[test]
    fn test_user_data_dir_fallback() {
        let paths = Paths::with_base(PathBuf::from("/srv/cb"));
        let mut cfg = Config::default();
        assert_eq!(cfg.user_data_dir(&paths), PathBuf::from("/srv/cb/chrome-data"));
        cfg.browser.user_data_dir = Some("/data/profile".to_string());
        assert_eq!(cfg.user_data_dir(&paths), PathBuf::from("/data/profile"));
    }
}
