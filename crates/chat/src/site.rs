//! URL conventions of the target chat application.

use chatbridge_browser::ResponseFilter;
use chatbridge_core::{Error, Result, SiteConfig};
use url::Url;

/// Parsed view over [`SiteConfig`]: the landing URL and how thread ids
/// appear in it (`<landing>/<id>`).
#[derive(Debug, Clone)]
pub struct SiteProfile {
    landing: Url,
    config: SiteConfig,
}

impl SiteProfile {
    pub fn new(config: SiteConfig) -> Result<Self> {
        let landing = Url::parse(&config.chat_url)
            .map_err(|e| Error::Config(format!("Invalid chatUrl '{}': {}", config.chat_url, e)))?;
        if landing.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "chatUrl '{}' cannot carry a thread path",
                config.chat_url
            )));
        }
        Ok(Self { landing, config })
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn landing_url(&self) -> &str {
        self.landing.as_str()
    }

    pub fn thread_url(&self, id: &str) -> String {
        let mut url = self.landing.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(id);
        }
        url.to_string()
    }

    /// True when `url` is the landing page itself (where the site sends
    /// unknown thread ids).
    pub fn is_landing(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(url) => same_origin(&url, &self.landing) && segments(&url) == segments(&self.landing),
            Err(_) => false,
        }
    }

    /// Thread id carried by `url`, if it is a `<landing>/<id>` URL.
    pub fn thread_id(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        if !same_origin(&url, &self.landing) {
            return None;
        }
        let base = segments(&self.landing);
        let path = segments(&url);
        if path.len() == base.len() + 1 && path.starts_with(&base) {
            path.last().map(|s| s.to_string())
        } else {
            None
        }
    }

    pub fn inference_filter(&self) -> ResponseFilter {
        ResponseFilter::new(&self.config.inference_path, &self.config.inference_method)
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> SiteProfile {
        SiteProfile::new(SiteConfig::default()).unwrap()
    }

    #[test]
    fn test_thread_url() {
        assert_eq!(profile().thread_url("abc123"), "https://venice.ai/chat/abc123");

        let mut cfg = SiteConfig::default();
        cfg.chat_url = "http://localhost:8080/chat/".to_string();
        let p = SiteProfile::new(cfg).unwrap();
        assert_eq!(p.thread_url("x"), "http://localhost:8080/chat/x");
    }

    #[test]
    fn test_thread_id() {
        let p = profile();
        assert_eq!(p.thread_id("https://venice.ai/chat/abc123").as_deref(), Some("abc123"));
        assert_eq!(p.thread_id("https://venice.ai/chat/abc123/").as_deref(), Some("abc123"));
        assert_eq!(p.thread_id("https://venice.ai/chat/abc123?ref=x").as_deref(), Some("abc123"));
        assert_eq!(p.thread_id("https://venice.ai/chat"), None);
        assert_eq!(p.thread_id("https://venice.ai/sign-in"), None);
        assert_eq!(p.thread_id("https://venice.ai/chat/a/b"), None);
        assert_eq!(p.thread_id("https://evil.example/chat/abc123"), None);
        assert_eq!(p.thread_id("about:blank"), None);
    }

    #[test]
    fn test_is_landing() {
        let p = profile();
        assert!(p.is_landing("https://venice.ai/chat"));
        assert!(p.is_landing("https://venice.ai/chat/"));
        assert!(!p.is_landing("https://venice.ai/chat/abc"));
        assert!(!p.is_landing("not a url"));
    }

    #[test]
    fn test_invalid_chat_url() {
        let mut cfg = SiteConfig::default();
        cfg.chat_url = "venice".to_string();
        assert_eq!(SiteProfile::new(cfg).unwrap_err().kind(), "ConfigError");

        let mut cfg = SiteConfig::default();
        cfg.chat_url = "mailto:someone@example.com".to_string();
        assert!(SiteProfile::new(cfg).is_err());
    }

    #[test]
    fn test_inference_filter() {
        let f = profile().inference_filter();
        assert!(f.matches("https://venice.ai/api/inference/chat", "POST"));
    }
}
