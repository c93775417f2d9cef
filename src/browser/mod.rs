//! 浏览器边界：页面驱动原语的抽象
//!
//! 核心只依赖这里的 trait（Page / EngineDriver / EngineHandle），不直接依赖
//! headless_chrome；测试注入假实现即可覆盖全部并发与错误路径。
//! 每个 SessionHandle 归属一个 worker 独占，Drop 保证任何退出路径（包括取消）
//! 都关闭会话，且只关闭一次。

pub mod chrome;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use chrome::ChromeDriver;

/// 页面交互失败（等待超时、元素缺失、导航失败、引擎故障）
#[derive(Error, Debug)]
pub enum PageError {
    #[error("timed out waiting for '{selector}' after {waited_ms}ms")]
    WaitTimeout { selector: String, waited_ms: u64 },

    #[error("element '{0}' not found")]
    ElementNotFound(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("engine failure: {0}")]
    Engine(String),
}

/// 一个活动页面：worker 与远端站点交互的唯一入口
///
/// 所有等待类操作都必须有界；超时以 PageError::WaitTimeout 返回，由上层决定
/// 是容忍、重试还是升级。
#[async_trait]
pub trait Page: Send + Sync {
    /// 当前页面 URL
    fn url(&self) -> String;

    async fn goto(&self, url: &str) -> Result<(), PageError>;

    async fn reload(&self) -> Result<(), PageError>;

    /// 读取元素文本；元素不存在或超时返回 Err
    async fn inner_text(&self, selector: &str) -> Result<String, PageError>;

    async fn click(&self, selector: &str) -> Result<(), PageError>;

    /// 元素当前是否可见（不等待）
    async fn is_visible(&self, selector: &str) -> Result<bool, PageError>;

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<(), PageError>;

    async fn wait_for_hidden(&self, selector: &str, timeout: Duration) -> Result<(), PageError>;
}

/// 新建会话的参数
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// 持久化会话状态文件；Some 时尝试 seed，失败由 SessionManager 回退
    pub storage_state: Option<PathBuf>,
    /// 拦截图片等非必要资源请求
    pub block_images: bool,
}

/// 引擎启动器：SessionManager 通过它惰性创建共享引擎
#[async_trait]
pub trait EngineDriver: Send + Sync {
    async fn launch(&self, headless: bool) -> Result<Arc<dyn EngineHandle>, PageError>;
}

/// 已启动的共享引擎：发放隔离会话，进程内至多存在一个实例
#[async_trait]
pub trait EngineHandle: Send + Sync {
    async fn open_session(&self, opts: &SessionOptions) -> Result<SessionHandle, PageError>;

    /// 关闭底层引擎；由 SessionManager 保证只调用一次
    async fn shutdown(&self);
}

/// 会话上下文的关闭器；close 必须可重入安全（SessionHandle 保证只调一次）
pub trait SessionContext: Send {
    fn close(&mut self);
}

/// 一个隔离会话：活动页面 + 上下文关闭器
///
/// worker 独占持有；显式 close 或 Drop 都会关闭上下文，二者合计只关闭一次，
/// 因此 worker 被取消（future 被丢弃）时清理同样会执行。
pub struct SessionHandle {
    page: Arc<dyn Page>,
    context: Option<Box<dyn SessionContext>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("context", &self.context.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn new(page: Arc<dyn Page>, context: Box<dyn SessionContext>) -> Self {
        Self {
            page,
            context: Some(context),
        }
    }

    pub fn page(&self) -> Arc<dyn Page> {
        self.page.clone()
    }

    /// 显式关闭本会话；只影响该会话，不影响共享引擎与其他会话
    pub fn close(mut self) {
        self.shut();
    }

    fn shut(&mut self) {
        if let Some(mut ctx) = self.context.take() {
            ctx.close();
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shut();
    }
}
