//! 赛季竞技场：一场速胜（出战 ×1、跳过动画、确认结算）

use std::time::Duration;

use async_trait::async_trait;

use crate::activities::Activity;
use crate::browser::Page;
use crate::core::error::WorkerError;

const FIGHT_1X: &str = "#season_fight_1x";
const SKIP: &str = "#btn_skip";
const CONFIRM_OK: &str = ".btn_ok";
const RESULT_INDICATOR: &str = "#season_result";

pub struct SeasonActivity;

#[async_trait]
impl Activity for SeasonActivity {
    fn path(&self) -> &str {
        "/season-arena.html"
    }

    async fn execute(&self, page: &dyn Page) -> Result<(), WorkerError> {
        if !page.is_visible(FIGHT_1X).await? {
            tracing::info!("no season fight available");
            return Ok(());
        }

        page.click(FIGHT_1X).await?;
        page.click(SKIP).await?;
        page.click(CONFIRM_OK).await?;

        // 结算弹层可能直接不出现，容忍
        if let Err(e) = page
            .wait_for_hidden(RESULT_INDICATOR, Duration::from_secs(15))
            .await
        {
            tracing::debug!(error = %e, "season result did not settle");
        }
        tracing::info!("season fight completed");
        Ok(())
    }
}
