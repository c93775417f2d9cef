//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WARDEN__*` 覆盖（双下划线表示嵌套，
//! 如 `WARDEN__BROWSER__HEADLESS=false`）。配置在启动时加载一次，之后只读。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub browser: BrowserSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub battle: BattleSection,
    /// 域名描述符列表；每个启用的 domain 对应一个独立 worker
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

/// [browser] 段：共享引擎启动参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headless: bool,
    /// 拦截图片等非必要资源请求，降低负载；对每个新建页面统一生效
    pub block_images: bool,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: true,
            block_images: true,
        }
    }
}

/// [auth] 段：持久化会话状态与登录入口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// 认证协作方产出的会话状态文件；存在且有效时用于 seed 新会话
    pub storage_state_path: PathBuf,
    pub login_url: String,
    /// 登录成功后页面上稳定存在的元素
    pub logged_in_selector: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            storage_state_path: PathBuf::from("state/storage_state.json"),
            login_url: String::new(),
            logged_in_selector: "#user_menu".to_string(),
        }
    }
}

/// [schedule] 段：错峰、间隔、冷却与重启退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub stagger_min_secs: f64,
    pub stagger_max_secs: f64,
    pub jitter_min_secs: f64,
    pub jitter_max_secs: f64,
    pub cooldown_secs: u64,
    pub heartbeat_secs: u64,
    pub restart_backoff_secs: u64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            stagger_min_secs: 3.0,
            stagger_max_secs: 12.0,
            jitter_min_secs: 2.0,
            jitter_max_secs: 6.0,
            cooldown_secs: 600,
            heartbeat_secs: 60,
            restart_backoff_secs: 30,
        }
    }
}

/// [api] 段：状态 / 触发 HTTP 边界监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub bind_addr: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

/// [battle] 段：战斗活动的静态配置（启动时加载一次，只读）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BattleSection {
    /// 能量条读数元素；读不到时按 0 处理（fail closed）
    pub energy_selector: String,
    pub fight_button: String,
    /// 战斗结束弹层；出现后消失视为一次交战确认完成
    pub result_indicator: String,
    /// 固定优先级目标列表；未配置 selector 的候选会被跳过
    pub targets: Vec<BattleTarget>,
}

impl Default for BattleSection {
    fn default() -> Self {
        Self {
            energy_selector: r#"#fight_energy_bar span[energy=""]"#.to_string(),
            fight_button: "#btn_fight".to_string(),
            result_indicator: "#battle_result".to_string(),
            targets: Vec::new(),
        }
    }
}

/// 战斗目标候选：按配置顺序尝试
#[derive(Debug, Clone, Deserialize)]
pub struct BattleTarget {
    pub name: String,
    /// 目标入口元素；None 表示该候选未配置，选择时跳过
    #[serde(default)]
    pub selector: Option<String>,
    /// 需要先导航到的页面路径；None 表示就地交战
    #[serde(default)]
    pub path: Option<String>,
}

/// 域名描述符：一个配置好的远端站点实例
#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub enabled: bool,
    /// 常规任务执行顺序（canonical path）
    #[serde(default)]
    pub tasks: Vec<String>,
    /// 该 domain 禁用的任务；出现在 tasks 中也会被跳过
    #[serde(default)]
    pub disabled_tasks: Vec<String>,
}

/// 从 config 目录加载配置，环境变量 WARDEN__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WARDEN__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WARDEN")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
