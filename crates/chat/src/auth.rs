//! Make sure the shared browser profile is signed in to the chat site.

use chatbridge_browser::{Tab, WaitCondition};
use chatbridge_core::{AuthConfig, Error, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::site::SiteProfile;

const BADGE_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    /// The profile already carried a session; holds the displayed user name.
    AlreadySignedIn(String),
    SignedIn,
    /// Guest session and no credentials configured.
    Skipped,
}

/// Open the landing page, read the user badge and run the two-step sign-in
/// form when the badge is missing or shows the guest marker.
pub async fn ensure_logged_in(
    tab: &dyn Tab,
    site: &SiteProfile,
    auth: &AuthConfig,
    page_timeout: Duration,
    navigation_timeout: Duration,
) -> Result<LoginStatus> {
    let cfg = site.config();
    tab.navigate(site.landing_url(), navigation_timeout).await?;

    let badge = match tab.wait_for(&cfg.user_badge, WaitCondition::Attached, BADGE_WAIT).await {
        Ok(()) => tab.text(&cfg.user_badge).await?,
        Err(Error::Timeout(_)) => None,
        Err(e) => return Err(e),
    };
    if let Some(name) = badge.map(|b| b.trim().to_string()) {
        if !name.is_empty() && !name.contains(&cfg.guest_marker) {
            info!(user = %name, "Already signed in");
            return Ok(LoginStatus::AlreadySignedIn(name));
        }
    }

    let Some((email, password)) = auth.credentials() else {
        warn!("Not signed in and no LOGIN_EMAIL/LOGIN_PASSWORD configured; continuing as guest");
        return Ok(LoginStatus::Skipped);
    };

    info!(email = %email, "Signing in");
    tab.navigate(&cfg.sign_in_url, navigation_timeout).await?;

    tab.wait_for(&cfg.identifier_input, WaitCondition::Visible, page_timeout).await?;
    tab.type_text(&cfg.identifier_input, email).await?;
    tab.click(&cfg.identifier_submit).await?;

    tab.wait_for(&cfg.password_input, WaitCondition::Visible, page_timeout).await?;
    tab.type_text(&cfg.password_input, password).await?;
    let before = tab.url().await?;
    tab.click(&cfg.password_submit).await?;
    tab.wait_for_navigation(&before, navigation_timeout).await?;

    info!("Signed in");
    Ok(LoginStatus::SignedIn)
}
