//! 发布流程 - 流程层
//!
//! 在项目工作区中完成发布：发布项目 → 继续 → 确认发布 → 返回项目。
//!
//! - 任一步骤失败时，等待固定时间后整体重试一次
//! - "继续"或"返回项目"之后页面出现内联错误提示，说明会话状态已损坏，
//!   直接返回 `BatchFatal`，不再重试

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{SiteSettings, Timeouts};
use crate::error::{BatchFatal, DriverError};
use crate::infrastructure::{PageDriver, Target};
use crate::workflow::pipeline::FormUi;
use crate::workflow::row_ctx::RowCtx;

pub mod selectors {
    pub const PUBLISH_PROJECT: &str = "Publish Project";
    pub const PROCEED: &str = "Proceed to Publish";
    pub const CONFIRM: &str = "Publish Data";
    pub const BACK_TO_PROJECT: &str = "Back to Project";
    pub const BUTTONS: &str = "button, a";
    pub const AGREEMENT: &str = "#publish-agreement, input[name='agree']";
    pub const INLINE_ERROR: &str = ".alert-danger";
}

/// 发布失败
#[derive(Debug)]
pub enum PublishFailure {
    /// 会话级错误，交给批次控制器
    Fatal(BatchFatal),
    /// 重试后仍然失败，记为行错误
    Failed(String),
}

enum AttemptError {
    Fatal(BatchFatal),
    Driver(DriverError),
}

impl From<DriverError> for AttemptError {
    fn from(err: DriverError) -> Self {
        AttemptError::Driver(err)
    }
}

/// 发布流程
pub struct PublishFlow {
    site: SiteSettings,
    timeouts: Timeouts,
}

impl PublishFlow {
    pub fn new(site: SiteSettings, timeouts: Timeouts) -> Self {
        Self { site, timeouts }
    }

    /// 发布当前项目
    ///
    /// # 参数
    /// - `driver`: 页面驱动
    /// - `ctx`: 行上下文
    /// - `workspace_id`: 项目 ID；当前页面不在该项目时先导航过去
    pub async fn publish(
        &self,
        driver: &dyn PageDriver,
        ctx: &RowCtx,
        workspace_id: Option<&str>,
    ) -> Result<(), PublishFailure> {
        let first = match self.attempt(driver, ctx, workspace_id).await {
            Ok(()) => return Ok(()),
            Err(AttemptError::Fatal(fatal)) => return Err(PublishFailure::Fatal(fatal)),
            Err(AttemptError::Driver(e)) => e,
        };

        debug!(
            "{} Publish attempt failed ({}), retrying in {:?}",
            ctx, first, self.timeouts.publish_retry_delay
        );
        sleep(self.timeouts.publish_retry_delay).await;

        match self.attempt(driver, ctx, workspace_id).await {
            Ok(()) => Ok(()),
            Err(AttemptError::Fatal(fatal)) => Err(PublishFailure::Fatal(fatal)),
            Err(AttemptError::Driver(e)) => {
                warn!("{} Publish failed after retry: {}", ctx, e);
                Err(PublishFailure::Failed(format!("Publish failed: {}", e)))
            }
        }
    }

    async fn attempt(
        &self,
        driver: &dyn PageDriver,
        ctx: &RowCtx,
        workspace_id: Option<&str>,
    ) -> Result<(), AttemptError> {
        let ui = FormUi::new(driver, self.timeouts);

        if let Some(id) = workspace_id {
            let url = ui.current_url().await?;
            if !url.contains(&format!("/datalumos/{}", id)) {
                debug!("{} Opening project {}", ctx, id);
                driver.navigate(&self.site.workspace_project_url(id)).await?;
            }
        }

        ui.click(&button(selectors::PUBLISH_PROJECT)).await?;
        ui.click(&button(selectors::PROCEED)).await?;
        self.check_inline_error(&ui, ctx, "proceed").await?;

        // 协议勾选框只在部分项目上出现
        if ui.click_any(&Target::css(selectors::AGREEMENT)).await.is_err() {
            debug!("{} No agreement checkbox", ctx);
        }
        ui.click(&button(selectors::CONFIRM)).await?;
        ui.click(&button(selectors::BACK_TO_PROJECT)).await?;
        self.check_inline_error(&ui, ctx, "return to project").await?;

        info!("{} ✓ Project published", ctx);
        Ok(())
    }

    async fn check_inline_error(
        &self,
        ui: &FormUi<'_>,
        ctx: &RowCtx,
        after: &str,
    ) -> Result<(), AttemptError> {
        ui.settle().await?;
        let errors = ui
            .driver()
            .count(&Target::css(selectors::INLINE_ERROR))
            .await?;
        if errors > 0 {
            warn!("{} Inline error shown after {}", ctx, after);
            return Err(AttemptError::Fatal(BatchFatal::new(format!(
                "inline error after {} while publishing {}",
                after, ctx.item
            ))));
        }
        Ok(())
    }
}

fn button(text: &str) -> Target {
    Target::containing(selectors::BUTTONS, text)
}
