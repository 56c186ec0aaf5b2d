use chatbridge_browser::find_browser_binary;
use chatbridge_core::{Config, Paths};
use std::time::Duration;

/// Run environment diagnostics.
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!();
    println!("🩺 chatbridge doctor - Environment Diagnostics");
    println!("================================");
    println!();

    let mut ok_count = 0u32;
    let mut warn_count = 0u32;
    let mut err_count = 0u32;

    // --- 1. Config ---
    println!("📋 Configuration");
    if paths.config_file().exists() {
        print_ok("Config file exists", &paths.config_file().display().to_string());
        ok_count += 1;
    } else {
        print_warn("No config file", "Defaults and environment variables will be used");
        warn_count += 1;
    }

    let config = match Config::load_with_env(&paths) {
        Ok(config) => {
            print_ok("Config parses", "");
            ok_count += 1;
            config
        }
        Err(e) => {
            print_err("Config invalid", &e.to_string());
            err_count += 1;
            Config::default()
        }
    };
    println!(
        "  Listen: {}:{}  Auth: {}",
        config.gateway.host,
        config.gateway.port,
        if config.gateway.api_token.is_some() { "bearer token" } else { "none" }
    );
    println!();

    // --- 2. Browser ---
    println!("🌐 Browser");
    match &config.browser.executable_path {
        Some(path) if std::path::Path::new(path).exists() => {
            print_ok("Configured executable", path);
            ok_count += 1;
        }
        Some(path) => {
            print_err("Configured executable not found", path);
            err_count += 1;
        }
        None => match find_browser_binary() {
            Some(path) => {
                print_ok("Browser found", &path);
                ok_count += 1;
            }
            None => {
                print_err("No Chrome/Chromium/Edge found", "Install one or set EXECUTABLE_PATH");
                err_count += 1;
            }
        },
    }

    let profile = config.user_data_dir(&paths);
    match std::fs::create_dir_all(&profile) {
        Ok(()) => {
            print_ok("Profile directory writable", &profile.display().to_string());
            ok_count += 1;
        }
        Err(e) => {
            print_err("Profile directory not writable", &format!("{}: {}", profile.display(), e));
            err_count += 1;
        }
    }
    println!("  Headless: {}", config.browser.headless);
    println!();

    // --- 3. Site ---
    println!("💬 Chat site");
    match chatbridge_chat::SiteProfile::new(config.site.clone()) {
        Ok(site) => {
            print_ok("Chat URL", site.landing_url());
            ok_count += 1;
        }
        Err(e) => {
            print_err("Chat URL invalid", &e.to_string());
            err_count += 1;
        }
    }

    let reachable = tokio::time::timeout(Duration::from_secs(10), tokio::net::TcpStream::connect(site_addr(&config.site.chat_url))).await;
    match reachable {
        Ok(Ok(_)) => {
            print_ok("Chat host reachable", "");
            ok_count += 1;
        }
        _ => {
            print_warn("Chat host not reachable", "Check network access");
            warn_count += 1;
        }
    }

    if config.auth.credentials().is_some() {
        print_ok("Login credentials configured", "");
        ok_count += 1;
    } else {
        print_warn("No login credentials", "Set LOGIN_EMAIL / LOGIN_PASSWORD to sign in automatically");
        warn_count += 1;
    }
    println!();

    println!("================================");
    println!("  {} ok, {} warnings, {} errors", ok_count, warn_count, err_count);
    println!();

    Ok(())
}

/// `host:port` of the chat URL for a plain TCP probe.
fn site_addr(chat_url: &str) -> String {
    let (scheme, rest) = chat_url.split_once("://").unwrap_or(("https", chat_url));
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.contains(':') {
        authority.to_string()
    } else {
        let port = if scheme.eq_ignore_ascii_case("http") { 80 } else { 443 };
        format!("{}:{}", authority, port)
    }
}

fn print_ok(label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  ✅ {}", label);
    } else {
        println!("  ✅ {} - {}", label, detail);
    }
}

fn print_warn(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ⚠️  {}", label);
    } else {
        println!("  ⚠️  {} - {}", label, hint);
    }
}

fn print_err(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ❌ {}", label);
    } else {
        println!("  ❌ {} - {}", label, hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_addr() {
        assert_eq!(site_addr("https://venice.ai/chat"), "venice.ai:443");
        assert_eq!(site_addr("http://localhost:8080/chat"), "localhost:8080");
        assert_eq!(site_addr("http://example.com"), "example.com:80");
    }
}
