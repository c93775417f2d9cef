//! 资源门控动作循环：CheckGate → SelectTarget → Engage → ConfirmOutcome
//!
//! 所有消耗资源的具体任务复用同一个状态机，只替换三个策略函数：门值读取、
//! 目标选择、交战动作。终止条件在每轮迭代顶部判定：门值 ≤ 0（Depleted）、
//! 选不出目标（NoTarget）、或不可恢复错误（上抛给调用方）。

use std::time::Duration;

use async_trait::async_trait;

use crate::browser::{Page, PageError};
use crate::core::error::WorkerError;

/// 导航重试次数上限；耗尽视为本轮致命
pub const NAV_ATTEMPTS: u32 = 3;
/// 导航重试的固定间隔
pub const NAV_RETRY_DELAY: Duration = Duration::from_secs(2);

/// 一个被选中的目标
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    /// 需要先导航到的页面；None 或与当前页一致时就地交战
    pub destination: Option<String>,
    /// 交战用的入口元素
    pub engage_selector: String,
}

/// 交战后的确认指示器：先出现、后消失
#[derive(Debug, Clone)]
pub struct ConfirmSpec {
    pub selector: String,
    pub appear_timeout: Duration,
    pub settle_timeout: Duration,
}

/// 具体任务提供的三个策略函数 + 可选确认指示器
#[async_trait]
pub trait ActionPolicy: Send + Sync {
    /// 从当前页面读出数值型门值（能量、剩余次数……）
    async fn read_gate(&self, page: &dyn Page) -> Result<i64, PageError>;

    /// 选出下一个目标；Ok(None) 表示没有可选目标
    async fn select_target(&self, page: &dyn Page) -> Result<Option<Target>, PageError>;

    /// 对目标执行一次有界动作；每轮迭代恰好调用一次
    async fn engage(&self, page: &dyn Page, target: &Target) -> Result<(), PageError>;

    fn confirmation(&self) -> Option<ConfirmSpec> {
        None
    }
}

/// 循环的正常终止方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// 门值耗尽（或读不出来，按 0 处理）
    Depleted,
    /// 选不出任何目标
    NoTarget,
}

pub struct ActionLoop {
    nav_attempts: u32,
    nav_delay: Duration,
}

impl Default for ActionLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionLoop {
    pub fn new() -> Self {
        Self {
            nav_attempts: NAV_ATTEMPTS,
            nav_delay: NAV_RETRY_DELAY,
        }
    }

    /// 缩短重试间隔（测试用）
    pub fn with_nav_delay(mut self, delay: Duration) -> Self {
        self.nav_delay = delay;
        self
    }

    /// 驱动状态机直到终止；Engage/ConfirmOutcome 的不可恢复错误原样上抛
    pub async fn run(
        &self,
        page: &dyn Page,
        policy: &dyn ActionPolicy,
    ) -> Result<LoopOutcome, WorkerError> {
        loop {
            let gate = self.check_gate(page, policy).await;
            if gate <= 0 {
                tracing::info!(gate, "gate depleted, loop done");
                return Ok(LoopOutcome::Depleted);
            }

            let target = match policy.select_target(page).await? {
                Some(t) => t,
                None => {
                    tracing::info!("no eligible target, loop done");
                    return Ok(LoopOutcome::NoTarget);
                }
            };

            if let Some(dest) = &target.destination {
                if page.url() != *dest {
                    self.navigate(page, dest).await?;
                }
            }

            tracing::debug!(target = %target.name, gate, "engaging");
            policy.engage(page, &target).await?;

            if let Some(spec) = policy.confirmation() {
                self.confirm(page, &spec).await;
            }
        }
    }

    /// CheckGate：读失败先 reload 重试一次，再失败按 0 处理。
    /// 读不出来的资源绝不假定非零（fail closed）。
    async fn check_gate(&self, page: &dyn Page, policy: &dyn ActionPolicy) -> i64 {
        match policy.read_gate(page).await {
            Ok(v) => v,
            Err(first) => {
                tracing::warn!(error = %first, "gate read failed, reloading once");
                if let Err(e) = page.reload().await {
                    tracing::warn!(error = %e, "reload failed, treating gate as 0");
                    return 0;
                }
                match policy.read_gate(page).await {
                    Ok(v) => v,
                    Err(second) => {
                        tracing::warn!(error = %second, "gate still unreadable, treating as 0");
                        0
                    }
                }
            }
        }
    }

    /// 目标导航：固定间隔重试，耗尽即本轮致命
    async fn navigate(&self, page: &dyn Page, url: &str) -> Result<(), WorkerError> {
        for attempt in 1..=self.nav_attempts {
            match page.goto(url).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(url, attempt, error = %e, "navigation attempt failed");
                    if attempt < self.nav_attempts {
                        tokio::time::sleep(self.nav_delay).await;
                    }
                }
            }
        }
        Err(WorkerError::NavigationExhausted {
            url: url.to_string(),
            attempts: self.nav_attempts,
        })
    }

    /// ConfirmOutcome：等待指示器出现再消失；超时容忍并记日志，
    /// 因为部分动作本来就没有可见确认。
    async fn confirm(&self, page: &dyn Page, spec: &ConfirmSpec) {
        if let Err(e) = page.wait_for_visible(&spec.selector, spec.appear_timeout).await {
            tracing::debug!(selector = %spec.selector, error = %e, "confirmation never appeared");
            return;
        }
        if let Err(e) = page.wait_for_hidden(&spec.selector, spec.settle_timeout).await {
            tracing::debug!(selector = %spec.selector, error = %e, "confirmation did not settle");
        }
    }
}

/// 候选：固定优先级选择用
#[derive(Debug, Clone)]
pub struct PriorityCandidate {
    pub name: String,
    /// None 表示该候选未配置，直接跳过
    pub selector: Option<String>,
    pub destination: Option<String>,
}

/// 策略 (a)：按配置顺序取第一个可见候选；未配置 selector 的候选跳过
pub async fn select_by_priority(
    page: &dyn Page,
    candidates: &[PriorityCandidate],
) -> Result<Option<Target>, PageError> {
    for candidate in candidates {
        let Some(selector) = &candidate.selector else {
            tracing::debug!(candidate = %candidate.name, "no selector configured, skipping");
            continue;
        };
        if page.is_visible(selector).await? {
            return Ok(Some(Target {
                name: candidate.name.clone(),
                destination: candidate.destination.clone(),
                engage_selector: selector.clone(),
            }));
        }
    }
    Ok(None)
}

/// 扫描比较的优化方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanObjective {
    Minimize,
    Maximize,
}

/// 候选：扫描比较选择用
#[derive(Debug, Clone)]
pub struct ScanCandidate {
    pub name: String,
    /// 数值属性所在元素（如对手战力）
    pub value_selector: String,
    pub engage_selector: String,
    pub destination: Option<String>,
}

/// 策略 (b)：在当前可见候选中按数值属性取最小/最大者；读不出数值的候选跳过
pub async fn select_by_scan(
    page: &dyn Page,
    candidates: &[ScanCandidate],
    objective: ScanObjective,
) -> Result<Option<Target>, PageError> {
    let mut best: Option<(i64, &ScanCandidate)> = None;
    for candidate in candidates {
        if !page.is_visible(&candidate.value_selector).await? {
            continue;
        }
        let raw = match page.inner_text(&candidate.value_selector).await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(candidate = %candidate.name, error = %e, "value unreadable, skipping");
                continue;
            }
        };
        let Some(value) = parse_number(&raw) else {
            continue;
        };
        let better = match (&best, objective) {
            (None, _) => true,
            (Some((b, _)), ScanObjective::Minimize) => value < *b,
            (Some((b, _)), ScanObjective::Maximize) => value > *b,
        };
        if better {
            best = Some((value, candidate));
        }
    }
    Ok(best.map(|(_, c)| Target {
        name: c.name.clone(),
        destination: c.destination.clone(),
        engage_selector: c.engage_selector.clone(),
    }))
}

/// 解析页面上的数值读数；容忍千分位与两侧杂字符（"1,234" → 1234）
pub fn parse_number(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 脚本化页面：goto 可注入失败，url/可见性/文本按表回答
    #[derive(Default)]
    struct FakePage {
        url: Mutex<String>,
        goto_calls: AtomicUsize,
        reload_calls: AtomicUsize,
        wait_visible_calls: AtomicUsize,
        fail_goto: bool,
        visible: Vec<String>,
        texts: Vec<(String, String)>,
    }

    #[async_trait]
    impl Page for FakePage {
        fn url(&self) -> String {
            self.url.lock().unwrap().clone()
        }
        async fn goto(&self, url: &str) -> Result<(), PageError> {
            self.goto_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_goto {
                return Err(PageError::Navigation {
                    url: url.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            *self.url.lock().unwrap() = url.to_string();
            Ok(())
        }
        async fn reload(&self) -> Result<(), PageError> {
            self.reload_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn inner_text(&self, selector: &str) -> Result<String, PageError> {
            self.texts
                .iter()
                .find(|(s, _)| s == selector)
                .map(|(_, t)| t.clone())
                .ok_or_else(|| PageError::ElementNotFound(selector.to_string()))
        }
        async fn click(&self, _selector: &str) -> Result<(), PageError> {
            Ok(())
        }
        async fn is_visible(&self, selector: &str) -> Result<bool, PageError> {
            Ok(self.visible.iter().any(|s| s == selector))
        }
        async fn wait_for_visible(
            &self,
            selector: &str,
            _timeout: Duration,
        ) -> Result<(), PageError> {
            self.wait_visible_calls.fetch_add(1, Ordering::SeqCst);
            if self.visible.iter().any(|s| s == selector) {
                Ok(())
            } else {
                Err(PageError::WaitTimeout {
                    selector: selector.to_string(),
                    waited_ms: 0,
                })
            }
        }
        async fn wait_for_hidden(
            &self,
            _selector: &str,
            _timeout: Duration,
        ) -> Result<(), PageError> {
            Ok(())
        }
    }

    /// 门值按脚本序列递减的策略；target=None 时选择落空
    struct FakePolicy {
        gates: Mutex<VecDeque<Result<i64, ()>>>,
        target: Option<Target>,
        confirm: Option<ConfirmSpec>,
        engages: AtomicUsize,
    }

    impl FakePolicy {
        fn new(gates: Vec<Result<i64, ()>>, target: Option<Target>) -> Self {
            Self {
                gates: Mutex::new(gates.into_iter().collect()),
                target,
                confirm: None,
                engages: AtomicUsize::new(0),
            }
        }

        fn with_confirmation(mut self, spec: ConfirmSpec) -> Self {
            self.confirm = Some(spec);
            self
        }
    }

    #[async_trait]
    impl ActionPolicy for FakePolicy {
        async fn read_gate(&self, _page: &dyn Page) -> Result<i64, PageError> {
            match self.gates.lock().unwrap().pop_front() {
                Some(Ok(v)) => Ok(v),
                Some(Err(())) => Err(PageError::ElementNotFound("#gate".to_string())),
                None => Ok(0),
            }
        }
        async fn select_target(&self, _page: &dyn Page) -> Result<Option<Target>, PageError> {
            Ok(self.target.clone())
        }
        async fn engage(&self, _page: &dyn Page, _target: &Target) -> Result<(), PageError> {
            self.engages.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn confirmation(&self) -> Option<ConfirmSpec> {
            self.confirm.clone()
        }
    }

    fn in_place_target() -> Target {
        Target {
            name: "troll".to_string(),
            destination: None,
            engage_selector: ".attack".to_string(),
        }
    }

    #[tokio::test]
    async fn test_zero_gate_terminates_without_engage() {
        let page = FakePage::default();
        let policy = FakePolicy::new(vec![Ok(0)], Some(in_place_target()));
        let outcome = ActionLoop::new().run(&page, &policy).await.unwrap();
        assert_eq!(outcome, LoopOutcome::Depleted);
        assert_eq!(policy.engages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_gate_sequence_bounds_iterations() {
        let page = FakePage::default();
        let policy = FakePolicy::new(
            vec![Ok(5), Ok(3), Ok(1), Ok(0)],
            Some(in_place_target()),
        );
        let outcome = ActionLoop::new().run(&page, &policy).await.unwrap();
        assert_eq!(outcome, LoopOutcome::Depleted);
        // 5、3、1 三次迭代各交战一次，读到 0 时终止
        assert_eq!(policy.engages.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_target_terminates() {
        let page = FakePage::default();
        let policy = FakePolicy::new(vec![Ok(5)], None);
        let outcome = ActionLoop::new().run(&page, &policy).await.unwrap();
        assert_eq!(outcome, LoopOutcome::NoTarget);
        assert_eq!(policy.engages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreadable_gate_reloads_then_fails_closed() {
        let page = FakePage::default();
        let policy = FakePolicy::new(vec![Err(()), Err(())], Some(in_place_target()));
        let outcome = ActionLoop::new().run(&page, &policy).await.unwrap();
        assert_eq!(outcome, LoopOutcome::Depleted);
        assert_eq!(page.reload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(policy.engages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreadable_gate_recovers_after_reload() {
        let page = FakePage::default();
        let policy = FakePolicy::new(vec![Err(()), Ok(1), Ok(0)], Some(in_place_target()));
        let outcome = ActionLoop::new().run(&page, &policy).await.unwrap();
        assert_eq!(outcome, LoopOutcome::Depleted);
        assert_eq!(policy.engages.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_navigation_exhaustion_is_fatal_after_three_attempts() {
        let page = FakePage {
            fail_goto: true,
            ..FakePage::default()
        };
        let target = Target {
            name: "troll".to_string(),
            destination: Some("https://game.example.com/troll-pre-battle.html".to_string()),
            engage_selector: ".attack".to_string(),
        };
        let policy = FakePolicy::new(vec![Ok(5)], Some(target));
        let result = ActionLoop::new()
            .with_nav_delay(Duration::from_millis(5))
            .run(&page, &policy)
            .await;
        match result {
            Err(WorkerError::NavigationExhausted { attempts, .. }) => {
                assert_eq!(attempts, NAV_ATTEMPTS)
            }
            other => panic!("Expected NavigationExhausted, got {other:?}"),
        }
        assert_eq!(page.goto_calls.load(Ordering::SeqCst), NAV_ATTEMPTS as usize);
        assert_eq!(policy.engages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_navigation_when_already_on_destination() {
        let url = "https://game.example.com/troll-pre-battle.html";
        let page = FakePage::default();
        *page.url.lock().unwrap() = url.to_string();
        let target = Target {
            name: "troll".to_string(),
            destination: Some(url.to_string()),
            engage_selector: ".attack".to_string(),
        };
        let policy = FakePolicy::new(vec![Ok(1), Ok(0)], Some(target));
        ActionLoop::new().run(&page, &policy).await.unwrap();
        assert_eq!(page.goto_calls.load(Ordering::SeqCst), 0);
        assert_eq!(policy.engages.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_confirmation_is_tolerated() {
        let page = FakePage::default();
        let policy = FakePolicy::new(vec![Ok(2), Ok(0)], Some(in_place_target()))
            .with_confirmation(ConfirmSpec {
                selector: "#battle_result".to_string(),
                appear_timeout: Duration::from_millis(5),
                settle_timeout: Duration::from_millis(5),
            });
        let outcome = ActionLoop::new().run(&page, &policy).await.unwrap();
        // 指示器一直没出现：记日志继续，循环照常走到门值耗尽
        assert_eq!(outcome, LoopOutcome::Depleted);
        assert_eq!(policy.engages.load(Ordering::SeqCst), 1);
        assert_eq!(page.wait_visible_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_select_by_priority_skips_unconfigured() {
        let page = FakePage {
            visible: vec![".bandit_row .attack".to_string()],
            ..FakePage::default()
        };
        let candidates = vec![
            PriorityCandidate {
                name: "dragon".to_string(),
                selector: None,
                destination: None,
            },
            PriorityCandidate {
                name: "troll".to_string(),
                selector: Some(".troll_row .attack".to_string()),
                destination: None,
            },
            PriorityCandidate {
                name: "bandit".to_string(),
                selector: Some(".bandit_row .attack".to_string()),
                destination: None,
            },
        ];
        let target = select_by_priority(&page, &candidates).await.unwrap().unwrap();
        assert_eq!(target.name, "bandit");
    }

    #[tokio::test]
    async fn test_select_by_scan_picks_minimum() {
        let page = FakePage {
            visible: vec![".opp1 .power".to_string(), ".opp2 .power".to_string()],
            texts: vec![
                (".opp1 .power".to_string(), "2,400".to_string()),
                (".opp2 .power".to_string(), "1,900".to_string()),
            ],
            ..FakePage::default()
        };
        let candidates = vec![
            ScanCandidate {
                name: "opp1".to_string(),
                value_selector: ".opp1 .power".to_string(),
                engage_selector: ".opp1 .challenge".to_string(),
                destination: None,
            },
            ScanCandidate {
                name: "opp2".to_string(),
                value_selector: ".opp2 .power".to_string(),
                engage_selector: ".opp2 .challenge".to_string(),
                destination: None,
            },
        ];
        let target = select_by_scan(&page, &candidates, ScanObjective::Minimize)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.name, "opp2");
    }

    #[tokio::test]
    async fn test_select_by_scan_picks_maximum() {
        let page = FakePage {
            visible: vec![".opp1 .power".to_string(), ".opp2 .power".to_string()],
            texts: vec![
                (".opp1 .power".to_string(), "2,400".to_string()),
                (".opp2 .power".to_string(), "1,900".to_string()),
            ],
            ..FakePage::default()
        };
        let candidates = vec![
            ScanCandidate {
                name: "opp1".to_string(),
                value_selector: ".opp1 .power".to_string(),
                engage_selector: ".opp1 .challenge".to_string(),
                destination: None,
            },
            ScanCandidate {
                name: "opp2".to_string(),
                value_selector: ".opp2 .power".to_string(),
                engage_selector: ".opp2 .challenge".to_string(),
                destination: None,
            },
        ];
        let target = select_by_scan(&page, &candidates, ScanObjective::Maximize)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.name, "opp1");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,234"), Some(1234));
        assert_eq!(parse_number(" 42 "), Some(42));
        assert_eq!(parse_number("energy: 7"), Some(7));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number(""), None);
    }
}
