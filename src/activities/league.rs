//! 联赛活动：剩余挑战次数门控，扫描可见对手挑战战力最低者
//!
//! 交战流程沿用站点的三连弹层：进入预战页、挑战 ×3、确认。

use std::time::Duration;

use async_trait::async_trait;

use crate::activities::Activity;
use crate::browser::{Page, PageError};
use crate::core::action_loop::{
    parse_number, select_by_scan, ActionLoop, ActionPolicy, ConfirmSpec, ScanCandidate,
    ScanObjective, Target,
};
use crate::core::error::WorkerError;

const ATTEMPTS_LEFT: &str = "#league_attempts";
/// 对手列表固定五行
const OPPONENT_ROWS: usize = 5;
const CHALLENGE_X3: &str = "#challenge_x3";
const CONFIRM_OK: &str = ".btn_ok";
const RESULT_INDICATOR: &str = "#league_result";

pub struct LeagueActivity;

#[async_trait]
impl Activity for LeagueActivity {
    fn path(&self) -> &str {
        "/leagues.html"
    }

    async fn execute(&self, page: &dyn Page) -> Result<(), WorkerError> {
        let outcome = ActionLoop::new().run(page, &LeaguePolicy).await?;
        tracing::info!(?outcome, "league loop finished");
        Ok(())
    }
}

struct LeaguePolicy;

#[async_trait]
impl ActionPolicy for LeaguePolicy {
    async fn read_gate(&self, page: &dyn Page) -> Result<i64, PageError> {
        let raw = page.inner_text(ATTEMPTS_LEFT).await?;
        parse_number(&raw).ok_or_else(|| PageError::ElementNotFound(ATTEMPTS_LEFT.to_string()))
    }

    /// 扫描当前可见对手，挑战力最低者
    async fn select_target(&self, page: &dyn Page) -> Result<Option<Target>, PageError> {
        let candidates: Vec<ScanCandidate> = (1..=OPPONENT_ROWS)
            .map(|i| ScanCandidate {
                name: format!("opponent_{i}"),
                value_selector: format!(".opponent_row:nth-child({i}) .power"),
                engage_selector: format!(".opponent_row:nth-child({i}) .go_pre_battle"),
                destination: None,
            })
            .collect();
        select_by_scan(page, &candidates, ScanObjective::Minimize).await
    }

    async fn engage(&self, page: &dyn Page, target: &Target) -> Result<(), PageError> {
        page.click(&target.engage_selector).await?;
        page.click(CHALLENGE_X3).await?;
        page.click(CONFIRM_OK).await
    }

    fn confirmation(&self) -> Option<ConfirmSpec> {
        Some(ConfirmSpec {
            selector: RESULT_INDICATOR.to_string(),
            appear_timeout: Duration::from_secs(10),
            settle_timeout: Duration::from_secs(30),
        })
    }
}
