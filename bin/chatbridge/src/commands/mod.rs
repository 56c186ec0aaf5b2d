pub mod ask;
pub mod doctor;
pub mod serve;

use chatbridge_browser::{BrowserDriver, ChromeDriver, LaunchOptions, Tab};
use chatbridge_chat::ChatService;
use chatbridge_core::{Config, Paths};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Launch the shared browser, leave a single anchor tab open, sign in and
/// build the chat service on top. The anchor tab must stay alive for as long
/// as the service does.
pub(crate) async fn start_service(
    config: &Config,
    paths: &Paths,
) -> anyhow::Result<(Arc<ChatService>, Arc<dyn Tab>)> {
    let opts = LaunchOptions {
        executable: config.browser.executable_path.as_ref().map(PathBuf::from),
        user_data_dir: config.user_data_dir(paths),
        headless: config.browser.headless,
        window_width: config.browser.window_width,
        window_height: config.browser.window_height,
        ready_timeout: Duration::from_secs(config.browser.launch_timeout_secs),
    };
    let driver = ChromeDriver::launch(&opts, Duration::from_millis(config.browser.command_timeout_ms)).await?;

    let anchor = driver.open_tab().await?;
    match driver.close_other_tabs(anchor.target_id()).await {
        Ok(0) => {}
        Ok(n) => info!(closed = n, "Closed tabs restored from the previous run"),
        Err(e) => warn!(error = %e, "Could not enumerate restored tabs"),
    }

    let service = Arc::new(ChatService::new(Arc::new(driver), config)?);
    if let Err(e) = service.ensure_logged_in(anchor.as_ref()).await {
        warn!(error = %e, "Sign-in check failed; continuing with the current profile state");
    }
    Ok((service, anchor))
}
