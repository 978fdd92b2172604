//! 批次控制器：分批、会话重启、降级与终止

mod common;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{FakeDriver, FakeFactory, RecordingOperator};
use datalumos_batch::error::{AppError, BatchFatal, DriverError, StoreError};
use datalumos_batch::models::{RowOutcome, WorkItem};
use datalumos_batch::orchestrator::{BatchController, ControllerSettings};
use datalumos_batch::workflow::{RowAbort, RowCtx, RowRunner};
use datalumos_batch::PageDriver;

/// 单次调用的预设结果
#[derive(Debug, Clone)]
enum Script {
    Ok,
    Warn,
    Fatal,
    FatalWith(Vec<usize>),
    Terminal,
}

/// 按行号回放预设结果的行处理器；没有预设的行直接成功
#[derive(Default)]
struct ScriptedRunner {
    scripts: HashMap<usize, Vec<Script>>,
    /// (行号, 批次序号)
    calls: Vec<(usize, usize)>,
    sessions: usize,
    abandoned: Vec<usize>,
}

impl ScriptedRunner {
    fn script(mut self, row: usize, results: Vec<Script>) -> Self {
        self.scripts.insert(row, results);
        self
    }

    fn calls_for(&self, row: usize) -> usize {
        self.calls.iter().filter(|(r, _)| *r == row).count()
    }
}

#[async_trait]
impl RowRunner for ScriptedRunner {
    async fn begin_session(&mut self, _driver: &dyn PageDriver) -> Result<(), DriverError> {
        self.sessions += 1;
        Ok(())
    }

    async fn run_row(
        &mut self,
        _driver: &dyn PageDriver,
        ctx: RowCtx,
    ) -> Result<RowOutcome, RowAbort> {
        let row = ctx.item.row;
        self.calls.push((row, ctx.batch_seq));
        let next = match self.scripts.get_mut(&row) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) => queue.first().cloned().unwrap_or(Script::Ok),
            None => Script::Ok,
        };

        let mut outcome = RowOutcome::new(row);
        outcome.correlation_id = Some(format!("{}", 239000 + row));
        match next {
            Script::Ok => Ok(outcome),
            Script::Warn => {
                outcome.warn("keyword could not be entered");
                Ok(outcome)
            }
            Script::Fatal => Err(BatchFatal::new("inline error after proceed").into()),
            Script::FatalWith(rows) => Err(BatchFatal::with_remaining(
                "inline error after proceed",
                rows.into_iter().map(WorkItem::new).collect(),
            )
            .into()),
            Script::Terminal => Err(RowAbort::Terminal(AppError::Store(StoreError::Io {
                path: "results.csv".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
            }))),
        }
    }

    async fn abandon_row(&mut self, ctx: RowCtx, reason: &str) -> Result<RowOutcome, AppError> {
        self.abandoned.push(ctx.item.row);
        let mut outcome = RowOutcome::new(ctx.item.row);
        outcome.error(reason.to_string());
        Ok(outcome)
    }
}

fn items(rows: impl IntoIterator<Item = usize>) -> Vec<WorkItem> {
    rows.into_iter().map(WorkItem::new).collect()
}

fn settings(batch_size: usize, max_restarts: u32) -> ControllerSettings {
    ControllerSettings {
        batch_size,
        max_batch_fatal_restarts: max_restarts,
        pause_at_end: false,
    }
}

fn controller(
    runner: ScriptedRunner,
    settings: ControllerSettings,
) -> (
    BatchController<FakeFactory, ScriptedRunner>,
    Arc<RecordingOperator>,
    FakeFactoryCounters,
) {
    let factory = FakeFactory::new(Arc::new(FakeDriver::new()));
    let counters = FakeFactoryCounters {
        opened: factory.opened.clone(),
        closed: factory.closed.clone(),
    };
    let operator = Arc::new(RecordingOperator::default());
    let controller = BatchController::new(factory, runner, operator.clone(), settings);
    (controller, operator, counters)
}

struct FakeFactoryCounters {
    opened: Arc<std::sync::atomic::AtomicUsize>,
    closed: Arc<std::sync::atomic::AtomicUsize>,
}

impl FakeFactoryCounters {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn every_item_is_processed_once_in_consecutive_batches() {
    let (mut controller, operator, counters) =
        controller(ScriptedRunner::default(), settings(3, 3));

    let report = controller.run(&items(1..=7)).await.unwrap();

    assert_eq!(report.visited, items(1..=7));
    assert_eq!(report.batches, vec![1, 2, 3]);
    assert_eq!(report.success, 7);
    assert_eq!(report.restarts, 0);
    assert_eq!(counters.opened(), 3);
    assert_eq!(counters.closed(), 3);
    assert_eq!(controller.runner().sessions, 3);
    assert!(operator.prompts().is_empty());
}

#[tokio::test]
async fn session_level_error_reschedules_rest_of_batch_next() {
    let runner = ScriptedRunner::default().script(2, vec![Script::Fatal, Script::Ok]);
    let (mut controller, _operator, counters) = controller(runner, settings(3, 3));

    let report = controller.run(&items(1..=6)).await.unwrap();

    // 批次 1 在第 2 行中断，剩余 [2, 3] 作为批次 3 紧接着执行，然后才是批次 2
    assert_eq!(report.batches, vec![1, 3, 2]);
    assert_eq!(report.restarts, 1);
    assert_eq!(report.visited, items(1..=6));
    assert_eq!(controller.runner().calls_for(1), 1);
    assert_eq!(controller.runner().calls_for(2), 2);
    assert_eq!(controller.runner().calls_for(3), 1);
    assert!(controller.runner().calls.contains(&(3, 3)));
    assert_eq!(counters.opened(), 3);
    assert_eq!(counters.closed(), 3);
}

#[tokio::test]
async fn fatal_on_last_item_still_retries_that_item() {
    let runner = ScriptedRunner::default().script(3, vec![Script::Fatal, Script::Ok]);
    let (mut controller, _operator, _counters) = controller(runner, settings(3, 3));

    let report = controller.run(&items(1..=3)).await.unwrap();

    assert_eq!(report.batches, vec![1, 2]);
    assert_eq!(report.visited, items(1..=3));
    assert_eq!(controller.runner().calls.last(), Some(&(3, 2)));
}

#[tokio::test]
async fn explicit_remaining_items_replace_computed_ones() {
    let runner = ScriptedRunner::default().script(2, vec![Script::FatalWith(vec![3])]);
    let (mut controller, _operator, _counters) = controller(runner, settings(3, 3));

    let report = controller.run(&items(1..=3)).await.unwrap();

    assert_eq!(report.visited, items([1, 3]));
    assert_eq!(controller.runner().calls_for(2), 1);
}

#[tokio::test]
async fn repeated_session_errors_demote_row_to_row_error() {
    let runner = ScriptedRunner::default().script(2, vec![Script::Fatal]);
    let (mut controller, _operator, counters) = controller(runner, settings(3, 2));

    let report = controller.run(&items(1..=6)).await.unwrap();

    assert_eq!(report.demoted, vec![2]);
    assert_eq!(controller.runner().abandoned, vec![2]);
    assert_eq!(controller.runner().calls_for(2), 2);
    assert_eq!(report.restarts, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.success, 5);
    assert_eq!(report.total(), 6);
    // 1 → [2,3] → [3] → 2
    assert_eq!(report.batches, vec![1, 3, 4, 2]);
    assert_eq!(counters.opened(), 4);
}

#[tokio::test]
async fn warnings_count_as_partial() {
    let runner = ScriptedRunner::default().script(1, vec![Script::Warn]);
    let (mut controller, _operator, _counters) = controller(runner, settings(5, 3));

    let report = controller.run(&items(1..=2)).await.unwrap();

    assert_eq!((report.success, report.partial, report.failed), (1, 1, 0));
}

#[tokio::test]
async fn terminal_error_waits_for_operator_then_stops() {
    let runner = ScriptedRunner::default().script(2, vec![Script::Terminal]);
    let (mut controller, operator, counters) = controller(runner, settings(2, 3));

    let result = controller.run(&items(1..=4)).await;

    assert!(matches!(result, Err(AppError::Store(_))));
    let prompts = operator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Run cannot continue"));
    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.closed(), 1);
    assert_eq!(controller.runner().calls_for(3), 0);
}

#[tokio::test]
async fn session_open_failure_stops_the_run() {
    let driver = Arc::new(FakeDriver::new());
    let mut factory = FakeFactory::new(driver);
    factory.fail_on_open = Some(2);
    let operator = Arc::new(RecordingOperator::default());
    let mut controller = BatchController::new(
        factory,
        ScriptedRunner::default(),
        operator.clone(),
        settings(2, 3),
    );

    let result = controller.run(&items(1..=4)).await;

    assert!(matches!(result, Err(AppError::Driver(_))));
    assert_eq!(controller.runner().calls.len(), 2);
    assert_eq!(operator.prompts().len(), 1);
}

#[tokio::test]
async fn pause_at_end_prompts_once_before_closing() {
    let mut s = settings(2, 3);
    s.pause_at_end = true;
    let (mut controller, operator, _counters) = controller(ScriptedRunner::default(), s);

    controller.run(&items(1..=5)).await.unwrap();

    assert_eq!(operator.prompts().len(), 1);
    assert!(operator.prompts()[0].contains("All rows processed"));
}

#[tokio::test]
async fn empty_selection_opens_no_session() {
    let (mut controller, _operator, counters) =
        controller(ScriptedRunner::default(), settings(3, 3));

    let report = controller.run(&[]).await.unwrap();

    assert_eq!(report.total(), 0);
    assert_eq!(counters.opened(), 0);
}
