//! warden-auth - 登录引导
//!
//! 建立持久化会话状态：状态文件已存在则直接跳过；否则打开登录页，用环境
//! 变量 GAME_USERNAME / GAME_PASSWORD 自动填表提交，把会话 cookies 落盘为
//! storage state，供编排器 seed 新会话。headless_chrome 是同步 API，这里
//! 不需要 tokio 运行时。

use std::time::Duration;

use anyhow::Context;
use headless_chrome::{Browser, LaunchOptions};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use warden::browser::chrome::write_storage_state;
use warden::load_config;

const USERNAME_SELECTOR: &str =
    r#"input[name="username"], input[type="text"], input[type="email"]"#;
const PASSWORD_SELECTOR: &str = r#"input[name="password"], input[type="password"]"#;
const SUBMIT_SELECTOR: &str = r#"button[type="submit"], input[type="submit"]"#;
/// 提交后给站点落 cookies 的时间
const POST_LOGIN_SETTLE: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let cfg = load_config(None).context("Failed to load config")?;
    let state_path = &cfg.auth.storage_state_path;

    if state_path.exists() {
        tracing::info!(path = %state_path.display(), "storage state found, skipping login");
        return Ok(());
    }
    if cfg.auth.login_url.is_empty() {
        anyhow::bail!("auth.login_url is not configured");
    }

    tracing::info!(path = %state_path.display(), "storage state not found, initiating login");

    let opts = LaunchOptions::default_builder()
        .headless(cfg.browser.headless)
        .build()
        .context("Failed to build launch options")?;
    let browser = Browser::new(opts).context("Failed to launch browser")?;
    let tab = browser.new_tab().context("Failed to open tab")?;

    tab.navigate_to(&cfg.auth.login_url)
        .and_then(|t| t.wait_until_navigated())
        .context("Failed to open login page")?;

    let username = std::env::var("GAME_USERNAME").ok().filter(|s| !s.is_empty());
    let password = std::env::var("GAME_PASSWORD").ok().filter(|s| !s.is_empty());

    match (username, password) {
        (Some(username), Some(password)) => {
            tracing::info!("attempting automated login with environment credentials");
            if let Err(e) = submit_login(&tab, &username, &password, &cfg.auth.logged_in_selector) {
                tracing::error!(error = %e, "automated login failed");
            }
        }
        _ => {
            tracing::info!("no credentials in GAME_USERNAME / GAME_PASSWORD, saving state as-is");
            std::thread::sleep(Duration::from_secs(2));
        }
    }

    let cookies = tab.get_cookies().context("Failed to read cookies")?;
    write_storage_state(state_path, &cookies).context("Failed to write storage state")?;
    tracing::info!(path = %state_path.display(), cookies = cookies.len(), "storage state saved");
    Ok(())
}

fn submit_login(
    tab: &headless_chrome::Tab,
    username: &str,
    password: &str,
    logged_in_selector: &str,
) -> anyhow::Result<()> {
    tab.find_element(USERNAME_SELECTOR)
        .context("username field not found")?
        .click()?;
    tab.type_str(username)?;
    tab.find_element(PASSWORD_SELECTOR)
        .context("password field not found")?
        .click()?;
    tab.type_str(password)?;
    tab.find_element(SUBMIT_SELECTOR)
        .context("submit button not found")?
        .click()?;

    // 等登录态指示元素出现；没等到也继续落盘，让编排器的认证探测裁决
    if !logged_in_selector.is_empty() {
        match tab.wait_for_element_with_custom_timeout(logged_in_selector, Duration::from_secs(15))
        {
            Ok(_) => tracing::info!("login confirmed"),
            Err(e) => tracing::warn!(error = %e, "login indicator did not appear"),
        }
    }
    std::thread::sleep(POST_LOGIN_SETTLE);
    Ok(())
}
