//! HTTP 边界：状态查询 + ad-hoc 任务触发
//!
//! 只做边界：读 StatusRegistry 快照、登记 ad-hoc 请求；执行仍由各 worker
//! 在安全检查点完成，接口立即返回受影响的 domain 列表。

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::core::status::{DomainStatus, StatusRegistry};

/// 触发响应：登记结果与受影响的 domain
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub message: String,
    pub task: String,
    pub domains: Vec<String>,
}

/// 创建状态 / 触发路由
pub fn create_router(registry: Arc<StatusRegistry>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/trigger/:task", get(trigger))
        .route("/health", get(|| async { "OK" }))
        .with_state(registry)
}

/// GET /status - 全部 domain 的状态快照
async fn status(
    State(registry): State<Arc<StatusRegistry>>,
) -> Json<HashMap<String, DomainStatus>> {
    Json(registry.snapshot())
}

/// GET /trigger/{task} - 为所有 domain 登记一次 ad-hoc 任务
async fn trigger(
    State(registry): State<Arc<StatusRegistry>>,
    Path(task): Path<String>,
) -> Json<TriggerResponse> {
    let domains = registry.trigger_all(&task);
    tracing::info!(task = %task, domains = domains.len(), "ad-hoc trigger registered");
    Json(TriggerResponse {
        message: "trigger registered".to_string(),
        task,
        domains,
    })
}

/// 绑定监听地址并一直服务；bind 失败作为错误上抛由调用方决定去留
pub async fn serve(bind_addr: &str, registry: Arc<StatusRegistry>) -> anyhow::Result<()> {
    let app = create_router(registry);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "api listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DomainConfig};
    use crate::core::status::ExecState;

    fn registry_with(names: &[&str]) -> Arc<StatusRegistry> {
        let cfg = AppConfig {
            domains: names
                .iter()
                .map(|n| DomainConfig {
                    name: n.to_string(),
                    base_url: format!("https://{n}.example.com"),
                    enabled: true,
                    tasks: vec![],
                    disabled_tasks: vec![],
                })
                .collect(),
            ..AppConfig::default()
        };
        Arc::new(StatusRegistry::from_config(&cfg))
    }

    #[tokio::test]
    async fn test_status_returns_all_domains() {
        let registry = registry_with(&["game_v1", "game_v2"]);
        let Json(snapshot) = status(State(registry)).await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["game_v1"].state, ExecState::Idle);
    }

    #[tokio::test]
    async fn test_trigger_marks_every_domain_pending() {
        let registry = registry_with(&["game_v1", "game_v2"]);
        let Json(resp) = trigger(State(registry.clone()), Path("collect".to_string())).await;

        assert_eq!(resp.task, "collect");
        assert_eq!(resp.domains.len(), 2);
        assert!(registry.adhoc_requested());
        for name in ["game_v1", "game_v2"] {
            let s = registry.get(name).unwrap();
            assert!(s.adhoc_pending);
            assert_eq!(s.current_task.as_deref(), Some("collect"));
        }
    }
}
