//! 训练活动：有训练位就开一次训练

use async_trait::async_trait;

use crate::activities::Activity;
use crate::browser::Page;
use crate::core::error::WorkerError;

const START_TRAINING: &str = "#start_training";

pub struct TrainingActivity;

#[async_trait]
impl Activity for TrainingActivity {
    fn path(&self) -> &str {
        "/training"
    }

    async fn execute(&self, page: &dyn Page) -> Result<(), WorkerError> {
        if page.is_visible(START_TRAINING).await? {
            page.click(START_TRAINING).await?;
            tracing::info!("training started");
        } else {
            tracing::info!("no free training slot");
        }
        Ok(())
    }
}
