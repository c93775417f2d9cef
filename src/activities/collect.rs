//! 收集活动：回主页点一次「全部领取」，没有可领的就过

use async_trait::async_trait;

use crate::activities::{site_root, Activity};
use crate::browser::Page;
use crate::core::error::WorkerError;

const COLLECT_ALL: &str = "#collect_all";

pub struct CollectActivity;

#[async_trait]
impl Activity for CollectActivity {
    fn path(&self) -> &str {
        "/collect"
    }

    async fn execute(&self, page: &dyn Page) -> Result<(), WorkerError> {
        let home = format!("{}/home.html", site_root(&page.url()));
        page.goto(&home).await?;

        if page.is_visible(COLLECT_ALL).await? {
            page.click(COLLECT_ALL).await?;
            tracing::info!("collected all items");
        } else {
            tracing::info!("nothing to collect");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::browser::PageError;

    struct FakePage {
        url: Mutex<String>,
        collect_visible: bool,
        clicks: AtomicUsize,
    }

    #[async_trait]
    impl Page for FakePage {
        fn url(&self) -> String {
            self.url.lock().unwrap().clone()
        }
        async fn goto(&self, url: &str) -> Result<(), PageError> {
            *self.url.lock().unwrap() = url.to_string();
            Ok(())
        }
        async fn reload(&self) -> Result<(), PageError> {
            Ok(())
        }
        async fn inner_text(&self, selector: &str) -> Result<String, PageError> {
            Err(PageError::ElementNotFound(selector.to_string()))
        }
        async fn click(&self, _selector: &str) -> Result<(), PageError> {
            self.clicks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn is_visible(&self, _selector: &str) -> Result<bool, PageError> {
            Ok(self.collect_visible)
        }
        async fn wait_for_visible(
            &self,
            _selector: &str,
            _timeout: Duration,
        ) -> Result<(), PageError> {
            Ok(())
        }
        async fn wait_for_hidden(
            &self,
            _selector: &str,
            _timeout: Duration,
        ) -> Result<(), PageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_collect_clicks_when_visible() {
        let page = FakePage {
            url: Mutex::new("https://game-v1.example.com/collect".to_string()),
            collect_visible: true,
            clicks: AtomicUsize::new(0),
        };
        CollectActivity.execute(&page).await.unwrap();
        assert_eq!(page.clicks.load(Ordering::SeqCst), 1);
        assert_eq!(page.url(), "https://game-v1.example.com/home.html");
    }

    #[tokio::test]
    async fn test_collect_skips_when_nothing_to_collect() {
        let page = FakePage {
            url: Mutex::new("https://game-v1.example.com/collect".to_string()),
            collect_visible: false,
            clicks: AtomicUsize::new(0),
        };
        CollectActivity.execute(&page).await.unwrap();
        assert_eq!(page.clicks.load(Ordering::SeqCst), 0);
    }
}
