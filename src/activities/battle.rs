//! 战斗活动：能量门控的消耗循环
//!
//! 门值 = 能量条读数；目标按配置的固定优先级挑选；每次交战点一次进攻，
//! 等战斗结算弹层出现再消失。能量耗尽或无目标即收工。

use std::time::Duration;

use async_trait::async_trait;

use crate::activities::{site_root, Activity};
use crate::browser::{Page, PageError};
use crate::config::BattleSection;
use crate::core::action_loop::{
    parse_number, select_by_priority, ActionLoop, ActionPolicy, ConfirmSpec, PriorityCandidate,
    Target,
};
use crate::core::error::WorkerError;

const RESULT_APPEAR_TIMEOUT: Duration = Duration::from_secs(10);
const RESULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(20);

pub struct BattleActivity {
    cfg: BattleSection,
}

impl BattleActivity {
    pub fn new(cfg: BattleSection) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Activity for BattleActivity {
    fn path(&self) -> &str {
        "/troll-pre-battle.html"
    }

    async fn execute(&self, page: &dyn Page) -> Result<(), WorkerError> {
        let policy = BattlePolicy {
            cfg: &self.cfg,
            root: site_root(&page.url()),
        };
        let outcome = ActionLoop::new().run(page, &policy).await?;
        tracing::info!(?outcome, "battle loop finished");
        Ok(())
    }
}

struct BattlePolicy<'a> {
    cfg: &'a BattleSection,
    root: String,
}

#[async_trait]
impl ActionPolicy for BattlePolicy<'_> {
    /// 能量读数；"1,234" 这类千分位写法也能读
    async fn read_gate(&self, page: &dyn Page) -> Result<i64, PageError> {
        let raw = page.inner_text(&self.cfg.energy_selector).await?;
        parse_number(&raw).ok_or_else(|| PageError::ElementNotFound(self.cfg.energy_selector.clone()))
    }

    async fn select_target(&self, page: &dyn Page) -> Result<Option<Target>, PageError> {
        let candidates: Vec<PriorityCandidate> = self
            .cfg
            .targets
            .iter()
            .map(|t| PriorityCandidate {
                name: t.name.clone(),
                selector: t.selector.clone(),
                destination: t.path.as_ref().map(|p| format!("{}{}", self.root, p)),
            })
            .collect();
        select_by_priority(page, &candidates).await
    }

    async fn engage(&self, page: &dyn Page, target: &Target) -> Result<(), PageError> {
        page.click(&target.engage_selector).await?;
        page.click(&self.cfg.fight_button).await
    }

    fn confirmation(&self) -> Option<ConfirmSpec> {
        Some(ConfirmSpec {
            selector: self.cfg.result_indicator.clone(),
            appear_timeout: RESULT_APPEAR_TIMEOUT,
            settle_timeout: RESULT_SETTLE_TIMEOUT,
        })
    }
}
