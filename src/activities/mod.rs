//! 活动（任务）注册表
//!
//! 每个活动实现 Activity trait（path / execute），由 ActivityRegistry 按
//! canonical path 注册与查找。注册在进程初始化时通过显式 builder 一次完成
//! （顺序确定、可单测），之后只读，查找无需加锁。

pub mod battle;
pub mod collect;
pub mod home;
pub mod league;
pub mod season;
pub mod training;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::browser::Page;
use crate::config::AppConfig;
use crate::core::error::WorkerError;

pub use battle::BattleActivity;
pub use collect::CollectActivity;
pub use home::HomeActivity;
pub use league::LeagueActivity;
pub use season::SeasonActivity;
pub use training::TrainingActivity;

/// 活动 trait：无状态或只持有构造时加载的只读配置，
/// 绝不跨调用保留会话状态
#[async_trait]
pub trait Activity: Send + Sync {
    /// canonical path，同时是注册表键与 domain 任务顺序中的标识
    fn path(&self) -> &str;

    /// 在给定页面上执行活动；调用时页面已位于该活动的入口页
    async fn execute(&self, page: &dyn Page) -> Result<(), WorkerError>;
}

/// 活动注册表：按 path 存储 Arc<dyn Activity>；同名后注册者覆盖前者
#[derive(Default)]
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, activity: impl Activity + 'static) {
        let path = activity.path().to_string();
        self.activities.insert(path, Arc::new(activity));
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<dyn Activity>> {
        self.activities.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.activities.keys().cloned().collect()
    }
}

/// 显式构建默认注册表：全部活动在此集中注册，取代散落的自注册
pub fn build_default_registry(cfg: &AppConfig) -> ActivityRegistry {
    let mut registry = ActivityRegistry::new();
    registry.register(HomeActivity);
    registry.register(CollectActivity);
    registry.register(BattleActivity::new(cfg.battle.clone()));
    registry.register(LeagueActivity);
    registry.register(SeasonActivity);
    registry.register(TrainingActivity);
    registry
}

/// 从当前页面 URL 推出站点根（scheme://host）
pub(crate) fn site_root(url: &str) -> String {
    let mut parts = url.splitn(4, '/');
    let scheme = parts.next().unwrap_or("");
    let _ = parts.next();
    let host = parts.next().unwrap_or("");
    format!("{scheme}//{host}")
}
