//! Browser process launch and DevTools endpoint discovery.

use chatbridge_core::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Everything needed to start the shared browser process.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub executable: Option<PathBuf>,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub ready_timeout: Duration,
}

/// A spawned browser with its debugging port and browser-level endpoint.
pub struct LaunchedBrowser {
    pub process: Child,
    pub debug_port: u16,
    pub browser_ws_url: String,
}

/// Spawn the browser and wait until its DevTools endpoint answers.
pub async fn launch(opts: &LaunchOptions) -> Result<LaunchedBrowser> {
    let executable = match &opts.executable {
        Some(path) => path.clone(),
        None => find_browser_binary().map(PathBuf::from).ok_or_else(|| {
            Error::Browser(
                "No Chrome/Chromium/Edge binary found. Install one or set EXECUTABLE_PATH."
                    .to_string(),
            )
        })?,
    };

    std::fs::create_dir_all(&opts.user_data_dir)
        .map_err(|e| Error::Browser(format!("Failed to create user data dir: {}", e)))?;

    let debug_port = find_free_port().await?;
    let args = build_browser_args(opts, debug_port);

    info!(
        executable = %executable.display(),
        port = debug_port,
        headless = opts.headless,
        profile = %opts.user_data_dir.display(),
        "Launching browser"
    );

    let process = Command::new(&executable)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Browser(format!("Failed to launch {}: {}", executable.display(), e)))?;

    let browser_ws_url = wait_for_cdp_ready(debug_port, opts.ready_timeout).await?;
    debug!(ws_url = %browser_ws_url, "DevTools endpoint ready");

    Ok(LaunchedBrowser {
        process,
        debug_port,
        browser_ws_url,
    })
}

/// Command line for a Chromium-family browser.
pub fn build_browser_args(opts: &LaunchOptions, debug_port: u16) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", opts.user_data_dir.display()),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--start-maximized".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-extensions".to_string(),
        "--disable-popup-blocking".to_string(),
        "--disable-notifications".to_string(),
        "--disable-infobars".to_string(),
        "--disable-session-crashed-bubble".to_string(),
        "--password-store=basic".to_string(),
        format!("--window-size={},{}", opts.window_width, opts.window_height),
    ];
    if opts.headless {
        args.push("--headless=new".to_string());
    }
    args.push("about:blank".to_string());
    args
}

/// Find a Chromium-family browser binary on this system.
pub fn find_browser_binary() -> Option<String> {
    let candidates: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "microsoft-edge",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}

async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| Error::Browser(format!("Failed to bind to find free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::Browser(format!("Failed to get local addr: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}

/// Poll `/json/version` until the browser-level WebSocket URL shows up.
async fn wait_for_cdp_ready(port: u16, timeout: Duration) -> Result<String> {
    let start = Instant::now();
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(Error::Browser(format!(
                "Browser DevTools not ready after {:?} on port {}",
                timeout, port
            )));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Resolve a targetId to its WebSocket debugger URL via `/json/list`.
/// Retries a few times since a fresh target may not be listed immediately.
pub async fn get_target_ws_url(port: u16, target_id: &str) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = resp.json::<Vec<Value>>().await else {
            continue;
        };

        let ws_url = targets
            .iter()
            .find(|t| t.get("id").and_then(|v| v.as_str()) == Some(target_id))
            .and_then(|t| t.get("webSocketDebuggerUrl"))
            .and_then(|v| v.as_str());
        if let Some(ws_url) = ws_url {
            return Ok(ws_url.to_string());
        }
    }

    Err(Error::Browser(format!(
        "No WebSocket URL found for target '{}' after retries",
        target_id
    )))
}
