use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".chatbridge"))
            .unwrap_or_else(|| PathBuf::from(".chatbridge"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Default browser profile directory (cookies survive restarts).
    pub fn chrome_data_dir(&self) -> PathBuf {
        self.base.join("chrome-data")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
