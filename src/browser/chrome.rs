//! 浏览器边界的 headless_chrome 实现
//!
//! 共享一个 Chrome 进程，每个会话一个独立 Tab；持久化会话状态以 cookies JSON
//! 的形式落盘，seed 新会话时逐条写回。长阻塞调用（导航、元素等待）走
//! spawn_blocking，避免占死 tokio worker 线程。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;

use super::{EngineDriver, EngineHandle, Page, PageError, SessionContext, SessionHandle, SessionOptions};

/// 元素等待的默认上限
const ELEMENT_TIMEOUT: Duration = Duration::from_secs(5);
/// wait_for_hidden / wait_for_visible 的轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 被拦截的资源 URL 模式（block_images 打开时注入）
const BLOCKED_URL_PATTERNS: &[&str] = &["*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg"];

fn engine_err(e: impl std::fmt::Display) -> PageError {
    PageError::Engine(e.to_string())
}

/// 持久化会话状态文件的顶层结构（cookies 为 CDP Cookie 的 JSON 序列化）
#[derive(Deserialize)]
struct StorageState {
    cookies: Vec<serde_json::Value>,
}

/// 读取持久化会话状态并转为可写回的 CookieParam 列表
///
/// 文件缺失、JSON 损坏或字段不兼容都返回 Err，由 SessionManager 决定回退。
pub fn load_cookie_params(path: &Path) -> Result<Vec<Network::CookieParam>, PageError> {
    let raw = std::fs::read_to_string(path).map_err(engine_err)?;
    let state: StorageState = serde_json::from_str(&raw).map_err(engine_err)?;
    state
        .cookies
        .into_iter()
        .map(|c| serde_json::from_value::<Network::CookieParam>(c).map_err(engine_err))
        .collect()
}

/// 将当前会话 cookies 写为持久化会话状态文件（认证协作方使用）
pub fn write_storage_state(path: &Path, cookies: &[Network::Cookie]) -> Result<(), PageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(engine_err)?;
    }
    let state = serde_json::json!({ "cookies": cookies });
    let raw = serde_json::to_string_pretty(&state).map_err(engine_err)?;
    std::fs::write(path, raw).map_err(engine_err)?;
    Ok(())
}

/// EngineDriver 的 Chrome 实现：launch 即启动一个 Chrome 进程
pub struct ChromeDriver;

#[async_trait]
impl EngineDriver for ChromeDriver {
    async fn launch(&self, headless: bool) -> Result<Arc<dyn EngineHandle>, PageError> {
        let browser = tokio::task::spawn_blocking(move || {
            let opts = LaunchOptions::default_builder()
                .headless(headless)
                .build()
                .map_err(engine_err)?;
            Browser::new(opts).map_err(engine_err)
        })
        .await
        .map_err(engine_err)??;

        tracing::info!(headless, "Chrome engine launched");
        Ok(Arc::new(ChromeEngine {
            browser: Mutex::new(Some(browser)),
        }))
    }
}

/// 共享 Chrome 进程；shutdown 通过 take() 实现幂等
pub struct ChromeEngine {
    browser: Mutex<Option<Browser>>,
}

#[async_trait]
impl EngineHandle for ChromeEngine {
    async fn open_session(&self, opts: &SessionOptions) -> Result<SessionHandle, PageError> {
        let browser = {
            let guard = self.browser.lock().expect("browser lock poisoned");
            guard
                .as_ref()
                .cloned()
                .ok_or_else(|| PageError::Engine("engine already shut down".to_string()))?
        };

        let seed = match &opts.storage_state {
            Some(path) => Some(load_cookie_params(path)?),
            None => None,
        };
        let block_images = opts.block_images;

        let tab = tokio::task::spawn_blocking(move || -> Result<Arc<Tab>, PageError> {
            let tab = browser.new_tab().map_err(engine_err)?;

            if block_images {
                tab.call_method(Network::Enable {
                    max_total_buffer_size: None,
                    max_resource_buffer_size: None,
                    max_post_data_size: None,
                    enable_durable_messages: None,
                    report_direct_socket_traffic: None,
                })
                .map_err(engine_err)?;
                tab.call_method(Network::SetBlockedURLs {
                    urls: BLOCKED_URL_PATTERNS.iter().map(|s| s.to_string()).collect(),
                })
                .map_err(engine_err)?;
            }

            if let Some(cookies) = seed {
                tab.set_cookies(cookies).map_err(engine_err)?;
            }
            Ok(tab)
        })
        .await
        .map_err(engine_err)??;

        let page = Arc::new(ChromePage { tab: tab.clone() });
        Ok(SessionHandle::new(page, Box::new(ChromeContext { tab })))
    }

    async fn shutdown(&self) {
        // Browser Drop 即结束 Chrome 进程；take 保证只发生一次
        let taken = self.browser.lock().expect("browser lock poisoned").take();
        if taken.is_some() {
            tracing::info!("Chrome engine shut down");
        }
    }
}

/// 会话上下文 = 一个 Tab；关闭只影响本 Tab
struct ChromeContext {
    tab: Arc<Tab>,
}

impl SessionContext for ChromeContext {
    fn close(&mut self) {
        if let Err(e) = self.tab.close(true) {
            tracing::debug!(error = %e, "tab close failed (may already be gone)");
        }
    }
}

/// Page 的 Chrome 实现
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    /// 在 blocking 线程上执行一个 Tab 操作
    async fn blocking<T, F>(&self, f: F) -> Result<T, PageError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Tab>) -> Result<T, PageError> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || f(tab))
            .await
            .map_err(engine_err)?
    }

    fn visibility_js(selector: &str) -> String {
        format!(
            r#"(function() {{
                const el = document.querySelector("{}");
                return !!(el && el.offsetParent !== null);
            }})()"#,
            selector.replace('\\', "\\\\").replace('"', "\\\"")
        )
    }

    fn eval_visible(tab: &Arc<Tab>, selector: &str) -> Result<bool, PageError> {
        let result = tab
            .evaluate(&Self::visibility_js(selector), false)
            .map_err(engine_err)?;
        Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }
}

#[async_trait]
impl Page for ChromePage {
    fn url(&self) -> String {
        self.tab.get_url()
    }

    async fn goto(&self, url: &str) -> Result<(), PageError> {
        let url = url.to_string();
        self.blocking(move |tab| {
            tab.navigate_to(&url)
                .and_then(|t| t.wait_until_navigated())
                .map_err(|e| PageError::Navigation {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
            Ok(())
        })
        .await
    }

    async fn reload(&self) -> Result<(), PageError> {
        self.blocking(move |tab| {
            tab.reload(false, None).map_err(engine_err)?;
            tab.wait_until_navigated().map_err(engine_err)?;
            Ok(())
        })
        .await
    }

    async fn inner_text(&self, selector: &str) -> Result<String, PageError> {
        let sel = selector.to_string();
        self.blocking(move |tab| {
            let element = tab
                .wait_for_element_with_custom_timeout(&sel, ELEMENT_TIMEOUT)
                .map_err(|_| PageError::WaitTimeout {
                    selector: sel.clone(),
                    waited_ms: ELEMENT_TIMEOUT.as_millis() as u64,
                })?;
            element.get_inner_text().map_err(engine_err)
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        let sel = selector.to_string();
        self.blocking(move |tab| {
            let element = tab
                .wait_for_element_with_custom_timeout(&sel, ELEMENT_TIMEOUT)
                .map_err(|_| PageError::ElementNotFound(sel.clone()))?;
            element.click().map_err(engine_err)?;
            Ok(())
        })
        .await
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, PageError> {
        let sel = selector.to_string();
        self.blocking(move |tab| Self::eval_visible(&tab, &sel)).await
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        let sel = selector.to_string();
        self.blocking(move |tab| {
            let deadline = Instant::now() + timeout;
            loop {
                if Self::eval_visible(&tab, &sel)? {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(PageError::WaitTimeout {
                        selector: sel.clone(),
                        waited_ms: timeout.as_millis() as u64,
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        })
        .await
    }

    async fn wait_for_hidden(&self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        let sel = selector.to_string();
        self.blocking(move |tab| {
            let deadline = Instant::now() + timeout;
            loop {
                if !Self::eval_visible(&tab, &sel)? {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(PageError::WaitTimeout {
                        selector: sel.clone(),
                        waited_ms: timeout.as_millis() as u64,
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        })
        .await
    }
}

/// 会话状态文件存在且非空时返回 Some（供 SessionManager 决定是否 seed）
pub fn storage_state_if_present(path: &Path) -> Option<PathBuf> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Some(path.to_path_buf()),
        _ => None,
    }
}
