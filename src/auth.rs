//! 认证协作方
//!
//! worker 只负责「确认已登录」：导航到 domain 首页，探测登录态指示元素。
//! 建立登录态（填表、存 storage state）由 warden-auth 独立完成；核心只把
//! 持久化状态当作「存在且有效 / 缺失或无效」的黑盒。

use std::time::Duration;

use async_trait::async_trait;

use crate::browser::Page;
use crate::config::{AuthSection, DomainConfig};
use crate::core::error::WorkerError;

const LOGIN_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// 确认该 domain 的会话已认证；Ok(false) 表示未登录（非错误）
    async fn verify(&self, page: &dyn Page, domain: &DomainConfig) -> Result<bool, WorkerError>;
}

/// 默认实现：打开首页，等登录态指示元素出现
pub struct StorageStateAuthenticator {
    cfg: AuthSection,
}

impl StorageStateAuthenticator {
    pub fn new(cfg: AuthSection) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Authenticator for StorageStateAuthenticator {
    async fn verify(&self, page: &dyn Page, domain: &DomainConfig) -> Result<bool, WorkerError> {
        page.goto(&domain.base_url).await?;
        match page
            .wait_for_visible(&self.cfg.logged_in_selector, LOGIN_PROBE_TIMEOUT)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(domain = %domain.name, error = %e, "login indicator absent");
                Ok(false)
            }
        }
    }
}
