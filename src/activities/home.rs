//! 主页活动：到场即完成，主要用于保活与触发站点日常刷新

use async_trait::async_trait;

use crate::activities::Activity;
use crate::browser::Page;
use crate::core::error::WorkerError;

pub struct HomeActivity;

#[async_trait]
impl Activity for HomeActivity {
    fn path(&self) -> &str {
        "/home.html"
    }

    async fn execute(&self, page: &dyn Page) -> Result<(), WorkerError> {
        tracing::info!(url = %page.url(), "home page reached");
        Ok(())
    }
}
