//! 行处理器：用脚本化驱动走完创建 → 写回 → 发布 → 输出

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{
    complete_row, read_csv, test_config, upload_folder, write_input, FakeDriver, FakeFactory,
    InputRow, RecordingOperator, FIRST_WORKSPACE_ID,
};
use datalumos_batch::config::{Config, Mode};
use datalumos_batch::models::{fields, RowStatus, WorkItem};
use datalumos_batch::orchestrator::{BatchController, ControllerSettings};
use datalumos_batch::services::{CsvOutputStore, CsvRowSource};
use datalumos_batch::workflow::steps::{selectors, SUMMARY_MANDATORY};
use datalumos_batch::workflow::{RowAbort, RowCtx, RowDeps, RowProcessor, RowRunner};

const FLU_URL: &str = "https://data.cdc.gov/flu";

fn processor(config: &Config, operator: Arc<RecordingOperator>) -> RowProcessor {
    let deps = RowDeps {
        source: Arc::new(CsvRowSource::new(&config.input_csv)),
        output: Arc::new(CsvOutputStore::new(&config.output_csv, fields::SOURCE_URL)),
        operator,
        registry: None,
        nominator: None,
    };
    RowProcessor::new(config, deps)
}

fn ctx(row: usize) -> RowCtx {
    RowCtx::new(WorkItem::new(row), row, 1)
}

/// 写入输入表并建好上传目录
fn setup(dir: &Path, rows: &[InputRow]) -> Config {
    let config = test_config(dir);
    upload_folder(&config.upload_root, "flu", 2);
    write_input(&config.input_csv, rows);
    config
}

fn input_id(config: &Config, row: usize) -> String {
    let (_, rows) = read_csv(&config.input_csv);
    rows[row - 1]
        .get(fields::WORKSPACE_ID)
        .cloned()
        .unwrap_or_default()
}

#[tokio::test]
async fn complete_row_is_created_published_and_saved() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[complete_row(FLU_URL, "flu")]);
    let driver = FakeDriver::new();
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();

    assert_eq!(outcome.status(), RowStatus::Success, "{:?}", outcome);
    let expected_id = FIRST_WORKSPACE_ID.to_string();
    assert_eq!(outcome.correlation_id.as_deref(), Some(expected_id.as_str()));
    assert_eq!(input_id(&config, 1), expected_id);
    assert_eq!(driver.dropped(), 2);
    assert_eq!(driver.count_actions("Publish Data"), 1);

    let (_, out) = read_csv(&config.output_csv);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0][fields::SOURCE_URL], FLU_URL);
    assert_eq!(out[0][fields::WORKSPACE_ID], expected_id);
    assert_eq!(out[0][fields::STATUS], "Success");
    assert_eq!(out[0][fields::KEYWORDS_ENTERED], "influenza; surveillance");
    assert_eq!(out[0][fields::FILE_EXTENSIONS], "csv");
    // 两个文件各 1 行 2 列、8 字节
    assert_eq!(out[0][fields::DATASET_ROWS], "2");
    assert_eq!(out[0][fields::DATASET_COLUMNS], "2");
    assert_eq!(out[0][fields::DATASET_SIZE], "16 B");
}

#[tokio::test]
async fn missing_summary_adds_exactly_one_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut row = complete_row(FLU_URL, "flu");
    row.summary = "";
    let config = setup(dir.path(), &[row]);
    let driver = FakeDriver::new();
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();

    assert_eq!(outcome.warnings, vec![SUMMARY_MANDATORY.to_string()]);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.status(), RowStatus::PartialSuccess);
}

#[tokio::test]
async fn wrong_file_count_uploads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[complete_row(FLU_URL, "partial")]);
    upload_folder(&config.upload_root, "partial", 1);
    let driver = FakeDriver::new();
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();

    assert_eq!(driver.dropped(), 0);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].starts_with("Expected 2 files"));
    // 项目仍然创建并发布
    assert!(outcome.correlation_id.is_some());
    assert_eq!(driver.count_actions("Publish Data"), 1);
}

#[tokio::test]
async fn keyword_failure_is_a_warning_and_other_keywords_continue() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[complete_row(FLU_URL, "flu")]);
    let driver =
        FakeDriver::new().missing(&format!("{}[text='influenza']", selectors::KEYWORD_OPTION));
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();

    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("'influenza'"));
    let (_, out) = read_csv(&config.output_csv);
    assert_eq!(out[0][fields::KEYWORDS_ENTERED], "surveillance");
}

#[tokio::test]
async fn row_without_title_fails_without_project() {
    let dir = tempfile::tempdir().unwrap();
    let mut row = complete_row(FLU_URL, "flu");
    row.title = "";
    let config = setup(dir.path(), &[row]);
    let driver = FakeDriver::new();
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();

    assert_eq!(outcome.status(), RowStatus::Failed);
    assert!(outcome.correlation_id.is_none());
    assert!(driver.actions().is_empty());
    let (_, out) = read_csv(&config.output_csv);
    assert!(out[0][fields::STATUS].starts_with("Failed: Row has no title"));
}

#[tokio::test]
async fn publish_retry_that_succeeds_leaves_no_trace() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[complete_row(FLU_URL, "flu")]);
    let driver = FakeDriver::new().fail_once("Publish Project");
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();

    assert_eq!(driver.count_actions("click-failed"), 1);
    assert_eq!(outcome.status(), RowStatus::Success, "{:?}", outcome);
}

#[tokio::test]
async fn publish_failing_twice_is_a_row_error_with_id() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[complete_row(FLU_URL, "flu")]);
    let driver = FakeDriver::new()
        .fail_once("Publish Data")
        .fail_once("Publish Data");
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();

    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].starts_with("Publish failed"));
    assert_eq!(outcome.status(), RowStatus::PartialSuccess);
}

#[tokio::test]
async fn inline_error_aborts_row_and_restart_resumes_created_project() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[complete_row(FLU_URL, "flu")]);
    let driver = FakeDriver::new().inline_errors(1);
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let aborted = processor.run_row(&driver, ctx(1)).await;
    assert!(matches!(aborted, Err(RowAbort::BatchFatal(_))));
    // 工作区 ID 在发布之前已经写回
    assert_eq!(input_id(&config, 1), FIRST_WORKSPACE_ID.to_string());

    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();
    assert_eq!(
        outcome.correlation_id,
        Some(FIRST_WORKSPACE_ID.to_string())
    );
    assert_eq!(driver.count_actions(selectors::CONTINUE_TO_WORKSPACE), 1);
    assert_eq!(outcome.status(), RowStatus::Success);
}

#[tokio::test]
async fn resumed_row_keeps_warnings_and_uploads_from_first_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let mut row = complete_row(FLU_URL, "flu");
    row.summary = "";
    let config = setup(dir.path(), &[row]);
    let driver = FakeDriver::new().inline_errors(1);
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    assert!(matches!(
        processor.run_row(&driver, ctx(1)).await,
        Err(RowAbort::BatchFatal(_))
    ));
    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();

    assert_eq!(driver.count_actions(selectors::CONTINUE_TO_WORKSPACE), 1);
    assert_eq!(outcome.warnings, vec![SUMMARY_MANDATORY.to_string()]);
    assert_eq!(outcome.status(), RowStatus::PartialSuccess);

    let (_, out) = read_csv(&config.output_csv);
    assert_eq!(out.len(), 1);
    assert!(out[0][fields::STATUS].starts_with("Partial"));
    assert_eq!(out[0][fields::KEYWORDS_ENTERED], "influenza; surveillance");
    assert_eq!(out[0][fields::FILE_EXTENSIONS], "csv");
    assert_eq!(out[0][fields::DATASET_ROWS], "2");
}

#[tokio::test]
async fn only_publish_requires_numeric_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut row = complete_row(FLU_URL, "flu");
    row.workspace_id = "pending";
    let mut config = setup(dir.path(), &[row]);
    config.mode = Mode::OnlyPublish;
    let driver = FakeDriver::new();
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();

    assert_eq!(outcome.status(), RowStatus::Failed);
    assert!(outcome.errors[0].contains("is not numeric"));
    assert!(driver.actions().is_empty());
}

#[tokio::test]
async fn only_publish_opens_existing_project() {
    let dir = tempfile::tempdir().unwrap();
    let mut row = complete_row(FLU_URL, "flu");
    row.workspace_id = "239181";
    let mut config = setup(dir.path(), &[row]);
    config.mode = Mode::OnlyPublish;
    let driver = FakeDriver::new();
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();

    assert_eq!(outcome.status(), RowStatus::Success);
    let actions = driver.actions();
    assert!(actions[0].starts_with("navigate"));
    assert!(actions[0].contains("239181"));
    assert_eq!(driver.count_actions(selectors::NEW_PROJECT), 0);
}

#[tokio::test]
async fn no_publish_creates_without_publishing() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path(), &[complete_row(FLU_URL, "flu")]);
    config.mode = Mode::NoPublish;
    let driver = FakeDriver::new();
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let outcome = processor.run_row(&driver, ctx(1)).await.unwrap();

    assert_eq!(outcome.status(), RowStatus::Success);
    assert!(outcome.correlation_id.is_some());
    assert_eq!(driver.count_actions("Publish Project"), 0);
}

#[tokio::test]
async fn output_row_is_updated_not_duplicated() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[complete_row(FLU_URL, "flu")]);
    let driver = FakeDriver::new();

    for _ in 0..2 {
        let mut processor = processor(&config, Arc::new(RecordingOperator::default()));
        processor.run_row(&driver, ctx(1)).await.unwrap();
    }

    let (_, out) = read_csv(&config.output_csv);
    assert_eq!(out.len(), 1);
    assert_eq!(
        out[0][fields::WORKSPACE_ID],
        (FIRST_WORKSPACE_ID + 1).to_string()
    );
}

#[tokio::test]
async fn unreadable_row_is_recorded_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[complete_row(FLU_URL, "flu")]);
    let driver = FakeDriver::new();
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    let outcome = processor.run_row(&driver, ctx(9)).await.unwrap();

    assert_eq!(outcome.status(), RowStatus::Failed);
    assert!(outcome.errors[0].starts_with("Could not read row"));
}

#[tokio::test]
async fn abandoned_row_keeps_created_id_in_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[complete_row(FLU_URL, "flu")]);
    let driver = FakeDriver::new().inline_errors(1);
    let mut processor = processor(&config, Arc::new(RecordingOperator::default()));

    assert!(processor.run_row(&driver, ctx(1)).await.is_err());
    let outcome = processor
        .abandon_row(ctx(1), "Abandoned after 3 session restarts")
        .await
        .unwrap();

    assert_eq!(outcome.status(), RowStatus::PartialSuccess);
    let (_, out) = read_csv(&config.output_csv);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0][fields::WORKSPACE_ID], FIRST_WORKSPACE_ID.to_string());
    assert!(out[0][fields::STATUS].contains("Abandoned"));
    assert_eq!(out[0][fields::KEYWORDS_ENTERED], "influenza; surveillance");
    assert_eq!(out[0][fields::FILE_EXTENSIONS], "csv");
}

#[tokio::test]
async fn full_run_signs_in_once_per_batch() {
    let dir = tempfile::tempdir().unwrap();
    let rows = [
        complete_row("https://data.cdc.gov/a", "flu"),
        complete_row("https://data.cdc.gov/b", "flu"),
        complete_row("https://data.cdc.gov/c", "flu"),
    ];
    let config = setup(dir.path(), &rows);
    let driver = Arc::new(FakeDriver::new());
    let operator = Arc::new(RecordingOperator::default());
    let runner = processor(&config, operator.clone());
    let mut controller = BatchController::new(
        FakeFactory::new(driver.clone()),
        runner,
        operator.clone(),
        ControllerSettings {
            batch_size: 2,
            max_batch_fatal_restarts: 3,
            pause_at_end: false,
        },
    );

    let items: Vec<WorkItem> = (1..=3).map(WorkItem::new).collect();
    let report = controller.run(&items).await.unwrap();

    assert_eq!(report.success, 3);
    // 未配置账号：每个会话提示一次手动登录
    let logins = operator
        .prompts()
        .iter()
        .filter(|p| p.starts_with("MANUAL LOGIN REQUIRED"))
        .count();
    assert_eq!(logins, 2);

    let (_, out) = read_csv(&config.output_csv);
    assert_eq!(out.len(), 3);
    for (i, row) in (1..=3).enumerate() {
        assert_eq!(
            input_id(&config, row),
            (FIRST_WORKSPACE_ID + i as u64).to_string()
        );
    }
}
