//! 错误类型与处理策略
//!
//! 分层：瞬时读取错误在 ActionLoop 内部消化（按 0 处理），导航错误重试
//! 耗尽后升级为致命，worker 边界兜住一切并落 Error 状态，逃出编排循环的
//! 致命错误由 main 以固定退避重启整个流程。

use thiserror::Error;

use crate::browser::PageError;

/// 共享引擎或隔离会话无法创建
///
/// 两个变体的处置不同：引擎起不来意味着所有 domain 都无法工作（进程级
/// 重启）；单个会话打不开只影响发起的那个 domain（该 worker 落 Error，
/// 本轮其余 domain 照常）。
#[derive(Error, Debug)]
pub enum SessionStartError {
    #[error("engine launch failed: {0}")]
    EngineLaunch(String),

    #[error("session open failed: {0}")]
    SessionOpen(String),
}

/// worker 执行过程中的错误
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    SessionStart(#[from] SessionStartError),

    /// 认证失败：本轮放弃该 domain，下一轮重新认证
    #[error("authentication failed for {domain}: {reason}")]
    Auth { domain: String, reason: String },

    /// 固定次数的导航重试耗尽，本轮致命
    #[error("navigation to {url} failed after {attempts} attempts")]
    NavigationExhausted { url: String, attempts: u32 },

    #[error("activity '{path}' failed: {reason}")]
    Activity { path: String, reason: String },

    #[error(transparent)]
    Page(#[from] PageError),

    /// 进程级关闭取消了 worker
    #[error("worker cancelled")]
    Cancelled,
}
