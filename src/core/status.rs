//! 状态注册表：domain 名 → 可变状态记录，进程内唯一的共享可变状态
//!
//! 所有读写经由一把 std::sync::Mutex 串行化，锁只覆盖字段拷贝，绝不跨 await
//! 持有。ad-hoc 抢占信号是电平触发的 AtomicBool：worker 在安全检查点轮询，
//! 而不是阻塞等待脉冲（脉冲事件会被未在等待的 worker 错过）。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;

/// 执行状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ExecState {
    Idle,
    Busy,
    Error,
}

/// 一个 domain 的状态记录；只能通过 StatusRegistry::update 修改
#[derive(Clone, Debug, Serialize)]
pub struct DomainStatus {
    pub current_task: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub state: ExecState,
    pub adhoc_pending: bool,
    pub authenticated: bool,
}

impl Default for DomainStatus {
    fn default() -> Self {
        Self {
            current_task: None,
            last_run: None,
            state: ExecState::Idle,
            adhoc_pending: false,
            authenticated: false,
        }
    }
}

/// 部分更新：None 字段保持不变
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    current_task: Option<Option<String>>,
    last_run: Option<DateTime<Utc>>,
    state: Option<ExecState>,
    adhoc_pending: Option<bool>,
    authenticated: Option<bool>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.current_task = Some(Some(task.into()));
        self
    }

    pub fn clear_task(mut self) -> Self {
        self.current_task = Some(None);
        self
    }

    pub fn last_run_now(mut self) -> Self {
        self.last_run = Some(Utc::now());
        self
    }

    pub fn state(mut self, state: ExecState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn adhoc_pending(mut self, pending: bool) -> Self {
        self.adhoc_pending = Some(pending);
        self
    }

    pub fn authenticated(mut self, authed: bool) -> Self {
        self.authenticated = Some(authed);
        self
    }

    fn apply(&self, record: &mut DomainStatus) {
        if let Some(ref task) = self.current_task {
            record.current_task = task.clone();
        }
        if let Some(ts) = self.last_run {
            record.last_run = Some(ts);
        }
        if let Some(state) = self.state {
            record.state = state;
        }
        if let Some(pending) = self.adhoc_pending {
            record.adhoc_pending = pending;
        }
        if let Some(authed) = self.authenticated {
            record.authenticated = authed;
        }
    }

    fn raises_adhoc(&self) -> bool {
        self.adhoc_pending == Some(true)
    }
}

/// 状态注册表：由编排器显式构造并以引用注入各 worker，不做全局单例
pub struct StatusRegistry {
    domains: Mutex<HashMap<String, DomainStatus>>,
    adhoc_signal: AtomicBool,
}

impl StatusRegistry {
    /// 为配置中的每个 domain 建一条记录（仅这些，别无其他）
    pub fn from_config(cfg: &AppConfig) -> Self {
        let domains = cfg
            .domains
            .iter()
            .map(|d| (d.name.clone(), DomainStatus::default()))
            .collect();
        Self {
            domains: Mutex::new(domains),
            adhoc_signal: AtomicBool::new(false),
        }
    }

    /// 原子地部分更新一条记录；置 adhoc_pending=true 的更新同时拉高抢占信号。
    /// 未配置的 domain 名是记日志的 no-op，不是错误。
    pub fn update(&self, name: &str, update: StatusUpdate) {
        let mut domains = self.domains.lock().expect("status lock poisoned");
        match domains.get_mut(name) {
            Some(record) => {
                update.apply(record);
                if update.raises_adhoc() {
                    self.adhoc_signal.store(true, Ordering::SeqCst);
                }
            }
            None => {
                tracing::warn!(domain = name, "status update for unconfigured domain ignored");
            }
        }
    }

    /// 单条记录的即时拷贝；未配置返回 None
    pub fn get(&self, name: &str) -> Option<DomainStatus> {
        self.domains
            .lock()
            .expect("status lock poisoned")
            .get(name)
            .cloned()
    }

    /// 全部记录的时点拷贝；绝不暴露活动记录本身
    pub fn snapshot(&self) -> HashMap<String, DomainStatus> {
        self.domains.lock().expect("status lock poisoned").clone()
    }

    /// 抢占信号当前是否拉高（非阻塞，worker 在安全检查点调用）
    pub fn adhoc_requested(&self) -> bool {
        self.adhoc_signal.load(Ordering::SeqCst)
    }

    /// 为全部 domain 置入 ad-hoc 任务，返回受影响的名字（/trigger 的后备操作）
    pub fn trigger_all(&self, task: &str) -> Vec<String> {
        let mut domains = self.domains.lock().expect("status lock poisoned");
        let mut affected = Vec::with_capacity(domains.len());
        for (name, record) in domains.iter_mut() {
            record.current_task = Some(task.to_string());
            record.adhoc_pending = true;
            affected.push(name.clone());
        }
        if !affected.is_empty() {
            self.adhoc_signal.store(true, Ordering::SeqCst);
        }
        affected
    }

    /// 重扫全部记录，仅当没有任何 pending 时放低信号。
    /// 在锁内判定并写信号，避免「刚清信号，别的 domain 的请求还挂着」的竞争。
    pub fn clear_adhoc_if_none_pending(&self) {
        let domains = self.domains.lock().expect("status lock poisoned");
        let still_pending = domains.values().any(|d| d.adhoc_pending);
        if !still_pending {
            self.adhoc_signal.store(false, Ordering::SeqCst);
        }
    }
}
