//! 批次重启控制器 - 编排层
//!
//! ## 职责
//!
//! 1. **分批**：按 `batch_size` 把条目切分为连续批次
//! 2. **会话管理**：每个批次打开一个浏览器会话并登录一次，批次结束后关闭
//! 3. **会话级错误恢复**：行处理返回 `BatchFatal` 时关闭会话，
//!    把剩余条目作为新批次插入到当前批次之后，换新会话继续
//! 4. **降级**：同一行反复触发会话级错误达到上限后，改记为行错误，只重排它之后的条目
//! 5. **终止**：输出表不可写或运行中途无法打开会话时，先等待操作员确认再释放会话并结束
//! 6. **统计**：汇总每行的最终状态
//!
//! 条目严格串行处理，同一时刻只有一个会话。

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{AppError, BatchFatal};
use crate::infrastructure::PageDriver;
use crate::models::{partition, Batch, RowOutcome, RowStatus, WorkItem};
use crate::orchestrator::session::SessionFactory;
use crate::services::Operator;
use crate::utils::logging::{log_batch_complete, log_batch_start};
use crate::workflow::{RowAbort, RowCtx, RowRunner};

/// 控制器参数
#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub batch_size: usize,
    /// 同一行会话级错误的次数上限，0 表示不限制
    pub max_batch_fatal_restarts: u32,
    /// 运行结束时先等待操作员确认再关闭浏览器
    pub pause_at_end: bool,
}

/// 运行统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub success: usize,
    pub partial: usize,
    pub failed: usize,
    /// 会话级错误引起的会话重启次数
    pub restarts: usize,
    /// 被降级为行错误的行
    pub demoted: Vec<usize>,
    /// 得到最终结果的条目（按完成顺序）
    pub visited: Vec<WorkItem>,
    /// 实际执行的批次序号（按执行顺序）
    pub batches: Vec<usize>,
}

impl RunReport {
    fn record(&mut self, outcome: &RowOutcome) {
        match outcome.status() {
            RowStatus::Success => self.success += 1,
            RowStatus::PartialSuccess => self.partial += 1,
            RowStatus::Failed => self.failed += 1,
        }
        self.visited.push(WorkItem::new(outcome.row));
    }

    pub fn total(&self) -> usize {
        self.success + self.partial + self.failed
    }
}

/// 批次结束方式
enum BatchEnd {
    Finished { success: usize },
    Restart { remaining: Vec<WorkItem> },
}

/// 批次重启控制器
pub struct BatchController<F, R> {
    factory: F,
    runner: R,
    operator: Arc<dyn Operator>,
    settings: ControllerSettings,
}

impl<F, R> BatchController<F, R>
where
    F: SessionFactory,
    R: RowRunner,
{
    pub fn new(
        factory: F,
        runner: R,
        operator: Arc<dyn Operator>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            factory,
            runner,
            operator,
            settings,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// 处理全部条目
    ///
    /// # 返回
    /// 正常结束返回运行统计；终止性错误在操作员确认后返回 `Err`
    pub async fn run(&mut self, items: &[WorkItem]) -> Result<RunReport, AppError> {
        let mut queue: Vec<Batch> = partition(items, self.settings.batch_size);
        let mut next_seq = queue.len() + 1;
        let ordinals: HashMap<usize, usize> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.row, i + 1))
            .collect();
        let mut fatal_counts: HashMap<usize, u32> = HashMap::new();
        let mut report = RunReport::default();

        let mut i = 0;
        while i < queue.len() {
            let batch = queue[i].clone();
            let (first, last) = match (batch.items.first(), batch.items.last()) {
                (Some(first), Some(last)) => (first.row, last.row),
                _ => {
                    i += 1;
                    continue;
                }
            };
            log_batch_start(batch.seq, first, last, batch.items.len(), queue.len() - i - 1);
            report.batches.push(batch.seq);

            let session = match self.factory.open().await {
                Ok(session) => session,
                Err(e) => {
                    error!("❌ Could not open a browser session: {}", e);
                    self.operator
                        .confirm(&format!(
                            "Browser session could not be opened ({}). Press Enter to stop the run.",
                            e
                        ))
                        .await;
                    return Err(AppError::Driver(e));
                }
            };

            let driver = session.driver();
            if let Err(e) = self.runner.begin_session(driver.as_ref()).await {
                warn!("⚠️ Sign-in did not complete: {}", e);
                self.operator
                    .confirm(&format!(
                        "Sign-in did not complete ({}). Finish signing in in the browser, then press Enter.",
                        e
                    ))
                    .await;
            }

            let end = match self
                .run_batch(&batch, driver.as_ref(), &ordinals, &mut fatal_counts, &mut report)
                .await
            {
                Ok(end) => end,
                Err(e) => {
                    error!("❌ Run stopped: {}", e);
                    self.operator
                        .confirm(&format!(
                            "Run cannot continue ({}). Press Enter to close the browser and stop.",
                            e
                        ))
                        .await;
                    session.close().await;
                    return Err(e);
                }
            };

            match end {
                BatchEnd::Finished { success } => {
                    log_batch_complete(batch.seq, success, batch.items.len());
                }
                BatchEnd::Restart { remaining } => {
                    report.restarts += 1;
                    if !remaining.is_empty() {
                        info!(
                            "🔁 Rescheduling {} item(s) as batch {} in a new session",
                            remaining.len(),
                            next_seq
                        );
                        queue.insert(
                            i + 1,
                            Batch {
                                seq: next_seq,
                                items: remaining,
                            },
                        );
                        next_seq += 1;
                    }
                }
            }

            if i + 1 == queue.len() && self.settings.pause_at_end {
                self.operator
                    .confirm("All rows processed. Press Enter to close the browser.")
                    .await;
            }
            session.close().await;
            i += 1;
        }

        Ok(report)
    }

    async fn run_batch(
        &mut self,
        batch: &Batch,
        driver: &dyn PageDriver,
        ordinals: &HashMap<usize, usize>,
        fatal_counts: &mut HashMap<usize, u32>,
        report: &mut RunReport,
    ) -> Result<BatchEnd, AppError> {
        let mut success = 0;
        for (k, item) in batch.items.iter().enumerate() {
            let ordinal = ordinals.get(&item.row).copied().unwrap_or(k + 1);
            let ctx = RowCtx::new(*item, ordinal, batch.seq);

            match self.runner.run_row(driver, ctx).await {
                Ok(outcome) => {
                    if outcome.status() == RowStatus::Success {
                        success += 1;
                    }
                    report.record(&outcome);
                }
                Err(RowAbort::Terminal(e)) => return Err(e),
                Err(RowAbort::BatchFatal(fatal)) => {
                    warn!("{} ⚠️ Session-level error: {}", ctx, fatal.message);
                    let remaining = self
                        .handle_fatal(ctx, &batch.items[k..], fatal, fatal_counts, report)
                        .await?;
                    return Ok(BatchEnd::Restart { remaining });
                }
            }
        }
        Ok(BatchEnd::Finished { success })
    }

    /// 计算需要在新会话中重新处理的条目
    async fn handle_fatal(
        &mut self,
        ctx: RowCtx,
        from_failed: &[WorkItem],
        fatal: BatchFatal,
        fatal_counts: &mut HashMap<usize, u32>,
        report: &mut RunReport,
    ) -> Result<Vec<WorkItem>, AppError> {
        let count = fatal_counts.entry(ctx.item.row).or_insert(0);
        *count += 1;
        let count = *count;

        let remaining = fatal.remaining.unwrap_or_else(|| from_failed.to_vec());

        let limit = self.settings.max_batch_fatal_restarts;
        if limit == 0 || count < limit {
            return Ok(remaining);
        }

        warn!(
            "{} Giving up after {} session-level error(s), recording as row error",
            ctx, count
        );
        let reason = format!(
            "Abandoned after {} session restarts: {}",
            count, fatal.message
        );
        let outcome = self.runner.abandon_row(ctx, &reason).await?;
        report.record(&outcome);
        report.demoted.push(ctx.item.row);

        Ok(remaining
            .into_iter()
            .filter(|item| *item != ctx.item)
            .collect())
    }
}
