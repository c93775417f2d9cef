//! 会话管理：共享引擎惰性启动 + 按 domain 发放隔离会话
//!
//! 共享引擎在首个 start() 调用时创建一次，并发调用在 Mutex 上竞争，只有
//! 第一个承担启动开销；shutdown_shared 通过 take() 实现幂等。会话 seed 自
//! 持久化状态文件，文件不可读或被拒绝时静默回退为全新会话。

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::browser::chrome::storage_state_if_present;
use crate::browser::{EngineDriver, EngineHandle, SessionHandle, SessionOptions};
use crate::config::{AppConfig, DomainConfig};
use crate::core::error::SessionStartError;

pub struct SessionManager {
    driver: Arc<dyn EngineDriver>,
    engine: Mutex<Option<Arc<dyn EngineHandle>>>,
    headless: bool,
    block_images: bool,
    storage_state_path: std::path::PathBuf,
}

impl SessionManager {
    pub fn new(driver: Arc<dyn EngineDriver>, cfg: &AppConfig) -> Self {
        Self {
            driver,
            engine: Mutex::new(None),
            headless: cfg.browser.headless,
            block_images: cfg.browser.block_images,
            storage_state_path: cfg.auth.storage_state_path.clone(),
        }
    }

    /// 取共享引擎，没有则启动。锁覆盖整个启动过程，并发 start 安全地
    /// 竞争到同一个实例。
    async fn shared_engine(&self) -> Result<Arc<dyn EngineHandle>, SessionStartError> {
        let mut guard = self.engine.lock().await;
        if let Some(engine) = guard.as_ref() {
            return Ok(engine.clone());
        }
        let engine = self
            .driver
            .launch(self.headless)
            .await
            .map_err(|e| SessionStartError::EngineLaunch(e.to_string()))?;
        *guard = Some(engine.clone());
        Ok(engine)
    }

    /// 为一个 domain 开启隔离会话
    ///
    /// 持久化状态存在时先尝试 seed；seed 被拒绝则告警并回退为全新会话，
    /// 回退也失败才返回 SessionStartError。
    pub async fn start(&self, domain: &DomainConfig) -> Result<SessionHandle, SessionStartError> {
        let engine = self.shared_engine().await?;

        let seed = storage_state_if_present(&self.storage_state_path);
        let opts = SessionOptions {
            storage_state: seed.clone(),
            block_images: self.block_images,
        };

        match engine.open_session(&opts).await {
            Ok(handle) => Ok(handle),
            Err(e) if seed.is_some() => {
                tracing::warn!(
                    domain = %domain.name,
                    error = %e,
                    "storage state rejected, falling back to fresh session"
                );
                let fresh = SessionOptions {
                    storage_state: None,
                    block_images: self.block_images,
                };
                engine
                    .open_session(&fresh)
                    .await
                    .map_err(|e| SessionStartError::SessionOpen(e.to_string()))
            }
            Err(e) => Err(SessionStartError::SessionOpen(e.to_string())),
        }
    }

    /// 关闭共享引擎并释放；重复调用或从未启动时是 no-op
    pub async fn shutdown_shared(&self) {
        let taken = self.engine.lock().await.take();
        if let Some(engine) = taken {
            engine.shutdown().await;
        }
    }
}
