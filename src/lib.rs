//! Warden - 多域名浏览器自动化编排器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **browser**: 浏览器边界抽象与 headless_chrome 实现
//! - **core**: 状态登记、会话管理、资源门控动作循环、主控编排
//! - **activities**: 站点活动（首页、收集、战斗、联赛、赛季、训练）
//! - **auth**: 认证协作方（登录态探测）
//! - **api**: 状态查询 / ad-hoc 触发 HTTP 边界

pub mod activities;
pub mod api;
pub mod auth;
pub mod browser;
pub mod config;
pub mod core;

pub use config::{load_config, AppConfig};
pub use core::{Orchestrator, SessionManager, StatusRegistry};
