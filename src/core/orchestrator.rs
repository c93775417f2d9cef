//! 编排器：每个启用的 domain 一个并发 worker，主循环永续运转
//!
//! 一轮（cycle）= 错峰拉起全部 worker → 等全部收尾 → 冷却（带心跳日志）。
//! worker = 取会话 → 验登录 → 按配置顺序跑任务；每个任务之前先在安全检查点
//! 轮询 ad-hoc 抢占请求，有就先执行再清 pending。任何错误兜在 worker 边界，
//! 记为该 domain 的 Error 状态；会话在任何退出路径（含取消）都会被关闭。

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::activities::ActivityRegistry;
use crate::auth::Authenticator;
use crate::browser::Page;
use crate::config::{AppConfig, DomainConfig};
use crate::core::action_loop::{NAV_ATTEMPTS, NAV_RETRY_DELAY};
use crate::core::error::{SessionStartError, WorkerError};
use crate::core::session::SessionManager;
use crate::core::status::{ExecState, StatusRegistry, StatusUpdate};

pub struct Orchestrator {
    cfg: Arc<AppConfig>,
    registry: Arc<StatusRegistry>,
    sessions: Arc<SessionManager>,
    activities: Arc<ActivityRegistry>,
    auth: Arc<dyn Authenticator>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        cfg: Arc<AppConfig>,
        registry: Arc<StatusRegistry>,
        sessions: Arc<SessionManager>,
        activities: Arc<ActivityRegistry>,
        auth: Arc<dyn Authenticator>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            registry,
            sessions,
            activities,
            auth,
            cancel,
        }
    }

    /// 主循环：跑一轮、冷却、再来；被取消时返回 Ok。
    /// 逃到这里之外的错误由 main 以固定退避重启整个流程。
    pub async fn run(&self) -> Result<(), WorkerError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            self.run_cycle().await?;
            self.cooldown().await;
        }
    }

    /// 一轮：为每个启用的 domain 拉起一个 worker，相邻启动之间随机错峰，
    /// 然后等全部收尾（成功或已记录错误）。
    ///
    /// worker 级错误兜在各自 domain 的状态里；只有引擎启动失败（所有 domain
    /// 都无法工作）作为不可恢复错误上抛，交给外层重启。
    pub async fn run_cycle(&self) -> Result<(), WorkerError> {
        let enabled: Vec<DomainConfig> = self
            .cfg
            .domains
            .iter()
            .filter(|d| d.enabled)
            .cloned()
            .collect();
        if enabled.is_empty() {
            tracing::warn!("no enabled domains configured");
            return Ok(());
        }

        tracing::info!(domains = enabled.len(), "cycle starting");
        let mut handles = Vec::with_capacity(enabled.len());
        let count = enabled.len();
        for (i, domain) in enabled.into_iter().enumerate() {
            let registry = self.registry.clone();
            let sessions = self.sessions.clone();
            let activities = self.activities.clone();
            let auth = self.auth.clone();
            let schedule = self.cfg.schedule.clone();
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                run_worker(domain, registry, sessions, activities, auth, schedule, cancel).await
            }));

            // 最后一个 worker 之后不需要错峰
            if i + 1 < count {
                let stagger = random_range_secs(
                    self.cfg.schedule.stagger_min_secs,
                    self.cfg.schedule.stagger_max_secs,
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(stagger) => {}
                }
            }
        }

        let mut fatal = None;
        for result in join_all(handles).await {
            match result {
                Ok(Some(e)) => fatal = Some(e),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "worker task panicked or was aborted");
                }
            }
        }
        tracing::info!("cycle complete");
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 冷却：固定时长，期间按 heartbeat 间隔报剩余时间
    async fn cooldown(&self) {
        let total = Duration::from_secs(self.cfg.schedule.cooldown_secs);
        let heartbeat = Duration::from_secs(self.cfg.schedule.heartbeat_secs.max(1));
        let mut remaining = total;
        tracing::info!(secs = total.as_secs(), "cooldown starting");
        while !remaining.is_zero() {
            let step = remaining.min(heartbeat);
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(step) => {}
            }
            remaining = remaining.saturating_sub(step);
            if !remaining.is_zero() {
                tracing::info!(remaining_secs = remaining.as_secs(), "cooldown heartbeat");
            }
        }
    }

    /// 关闭共享引擎（进程退出或重启前调用）
    pub async fn shutdown(&self) {
        self.sessions.shutdown_shared().await;
    }
}

/// worker 顶层：边界兜错 + 取消。会话清理依赖 SessionHandle 的 Drop 守卫，
/// 因此 worker_body 的 future 被 select 丢弃时（取消路径）同样会关闭会话。
///
/// 返回 Some(err) 仅当错误对整个流程不可恢复（会话层失败）。
async fn run_worker(
    domain: DomainConfig,
    registry: Arc<StatusRegistry>,
    sessions: Arc<SessionManager>,
    activities: Arc<ActivityRegistry>,
    auth: Arc<dyn Authenticator>,
    schedule: crate::config::ScheduleSection,
    cancel: CancellationToken,
) -> Option<WorkerError> {
    tracing::info!(domain = %domain.name, "worker starting");
    let result = tokio::select! {
        _ = cancel.cancelled() => Err(WorkerError::Cancelled),
        res = worker_body(&domain, &registry, &sessions, &activities, auth.as_ref(), &schedule) => res,
    };

    match result {
        Ok(()) => {
            registry.update(
                &domain.name,
                StatusUpdate::new().state(ExecState::Idle).clear_task(),
            );
            tracing::info!(domain = %domain.name, "worker pass complete");
            None
        }
        Err(WorkerError::Cancelled) => {
            tracing::info!(domain = %domain.name, "worker cancelled");
            None
        }
        Err(e) => {
            registry.update(&domain.name, StatusUpdate::new().state(ExecState::Error));
            tracing::error!(domain = %domain.name, error = %e, "worker failed");
            // 单个会话打不开只算该 domain 的错；引擎整个起不来才值得重启进程
            matches!(
                e,
                WorkerError::SessionStart(SessionStartError::EngineLaunch(_))
            )
            .then_some(e)
        }
    }
}

async fn worker_body(
    domain: &DomainConfig,
    registry: &StatusRegistry,
    sessions: &SessionManager,
    activities: &ActivityRegistry,
    auth: &dyn Authenticator,
    schedule: &crate::config::ScheduleSection,
) -> Result<(), WorkerError> {
    let handle = sessions.start(domain).await?;
    let page = handle.page();

    let authed = auth.verify(page.as_ref(), domain).await?;
    registry.update(&domain.name, StatusUpdate::new().authenticated(authed));
    if !authed {
        return Err(WorkerError::Auth {
            domain: domain.name.clone(),
            reason: "login indicator absent".to_string(),
        });
    }

    for (i, task) in domain.tasks.iter().enumerate() {
        // 安全检查点：有挂起的 ad-hoc 请求就先执行
        if registry.adhoc_requested() {
            honor_adhoc(domain, registry, activities, page.as_ref()).await?;
        }

        if domain.disabled_tasks.iter().any(|t| t == task) {
            tracing::debug!(domain = %domain.name, task = %task, "task disabled, skipping");
            continue;
        }

        run_task(domain, registry, activities, page.as_ref(), task).await?;

        // 任务之间拉开随机间隔；最后一个任务之后没有下一个，不再等
        if i + 1 < domain.tasks.len() {
            let jitter = random_range_secs(schedule.jitter_min_secs, schedule.jitter_max_secs);
            tokio::time::sleep(jitter).await;
        }
    }

    handle.close();
    Ok(())
}

/// 执行本 domain 挂起的 ad-hoc 任务，然后清 pending 并视情况放低信号
async fn honor_adhoc(
    domain: &DomainConfig,
    registry: &StatusRegistry,
    activities: &ActivityRegistry,
    page: &dyn Page,
) -> Result<(), WorkerError> {
    let Some(status) = registry.get(&domain.name) else {
        return Ok(());
    };
    if !status.adhoc_pending {
        return Ok(());
    }

    if let Some(task) = status.current_task {
        let task = canonical_path(&task);
        tracing::info!(domain = %domain.name, task = %task, "honoring ad-hoc request");
        let result = run_task(domain, registry, activities, page, &task).await;
        registry.update(&domain.name, StatusUpdate::new().adhoc_pending(false));
        registry.clear_adhoc_if_none_pending();
        result?;
    } else {
        registry.update(&domain.name, StatusUpdate::new().adhoc_pending(false));
        registry.clear_adhoc_if_none_pending();
    }
    Ok(())
}

/// 单个任务：登记 Busy、导航到入口页（带重试）、执行活动
async fn run_task(
    domain: &DomainConfig,
    registry: &StatusRegistry,
    activities: &ActivityRegistry,
    page: &dyn Page,
    task: &str,
) -> Result<(), WorkerError> {
    let Some(activity) = activities.lookup(task) else {
        tracing::warn!(domain = %domain.name, task = %task, "no activity registered, skipping");
        return Ok(());
    };

    registry.update(
        &domain.name,
        StatusUpdate::new()
            .state(ExecState::Busy)
            .task(task)
            .last_run_now(),
    );

    let url = format!("{}{}", domain.base_url, task);
    navigate_with_retry(page, &url).await?;

    tracing::info!(domain = %domain.name, task = %task, "running activity");
    activity.execute(page).await.map_err(|e| match e {
        // 已分类的错误原样上抛，其余归到该活动名下
        e @ (WorkerError::NavigationExhausted { .. } | WorkerError::Cancelled) => e,
        e => WorkerError::Activity {
            path: task.to_string(),
            reason: e.to_string(),
        },
    })
}

/// 入口页导航：与 ActionLoop 相同的重试纪律
async fn navigate_with_retry(page: &dyn Page, url: &str) -> Result<(), WorkerError> {
    for attempt in 1..=NAV_ATTEMPTS {
        match page.goto(url).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(url, attempt, error = %e, "entry navigation failed");
                if attempt < NAV_ATTEMPTS {
                    tokio::time::sleep(NAV_RETRY_DELAY).await;
                }
            }
        }
    }
    Err(WorkerError::NavigationExhausted {
        url: url.to_string(),
        attempts: NAV_ATTEMPTS,
    })
}

/// 触发接口收到的任务名可能不带前导斜杠，统一成 canonical path
fn canonical_path(task: &str) -> String {
    if task.starts_with('/') {
        task.to_string()
    } else {
        format!("/{task}")
    }
}

fn random_range_secs(min: f64, max: f64) -> Duration {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let secs = if (hi - lo).abs() < f64::EPSILON {
        lo
    } else {
        rand::thread_rng().gen_range(lo..hi)
    };
    Duration::from_secs_f64(secs.max(0.0))
}
