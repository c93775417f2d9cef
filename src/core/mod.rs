//! 核心编排层：错误分类、状态登记、会话管理、资源门控动作循环、主控循环

pub mod action_loop;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod status;

pub use action_loop::{ActionLoop, ActionPolicy, LoopOutcome};
pub use error::{SessionStartError, WorkerError};
pub use orchestrator::Orchestrator;
pub use session::SessionManager;
pub use status::{DomainStatus, ExecState, StatusRegistry, StatusUpdate};
