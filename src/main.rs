//! Warden - 多域名浏览器自动化编排器
//!
//! 入口：初始化日志与配置，启动 HTTP 边界与主控循环；主控循环因不可恢复
//! 错误退出时按固定退避重启，Ctrl-C 触发全局取消并关闭共享引擎。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use warden::activities::build_default_registry;
use warden::auth::StorageStateAuthenticator;
use warden::browser::ChromeDriver;
use warden::core::{Orchestrator, SessionManager, StatusRegistry};
use warden::{api, load_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let cfg = Arc::new(load_config(None).context("Failed to load config")?);
    let registry = Arc::new(StatusRegistry::from_config(&cfg));
    let activities = Arc::new(build_default_registry(&cfg));
    let sessions = Arc::new(SessionManager::new(Arc::new(ChromeDriver), &cfg));
    let auth = Arc::new(StorageStateAuthenticator::new(cfg.auth.clone()));
    let cancel = CancellationToken::new();

    // HTTP 边界独立运行；worker 只通过 StatusRegistry 与它交互
    {
        let bind_addr = cfg.api.bind_addr.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(&bind_addr, registry).await {
                tracing::error!(error = %e, "api server exited");
            }
        });
    }

    // Ctrl-C -> 全局取消
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                cancel.cancel();
            }
        });
    }

    let backoff = Duration::from_secs(cfg.schedule.restart_backoff_secs);
    loop {
        let orchestrator = Orchestrator::new(
            cfg.clone(),
            registry.clone(),
            sessions.clone(),
            activities.clone(),
            auth.clone(),
            cancel.clone(),
        );

        let result = orchestrator.run().await;
        orchestrator.shutdown().await;

        if cancel.is_cancelled() {
            tracing::info!("orchestrator stopped, exiting");
            return result.map_err(Into::into);
        }

        // 不可恢复错误：关掉共享引擎后固定退避重启整个流程
        if let Err(e) = result {
            tracing::error!(error = %e, backoff_secs = backoff.as_secs(), "orchestrator crashed, restarting");
        }
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}
