//! CDC 数据采集（`collect` 命令）
//!
//! ## 职责
//!
//! 从机构数据清单中筛选尚未认领的 data.cdc.gov 数据页，为每个数据页：
//!
//! 1. 按标题建立（或清空）数据目录
//! 2. 检查 URL 是否可访问
//! 3. 在浏览器中打开并保存为 PDF
//! 4. 以 URL 为键写入采集结果表（重复运行不会产生重复行）

pub mod capture;
pub mod folders;
pub mod inventory;

use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppResult, ConfigError, StoreError};
use crate::models::fields;
use crate::services::{CsvOutputStore, CsvTable, OutputStore};

pub use capture::{BrowserCapture, HttpProbe, PageCapture, PageSnapshot, UrlProbe};
pub use folders::{prepare_title_folder, sanitize_folder_name};
pub use inventory::{eligible_rows, InventoryColumns, InventoryRow};

/// 采集结果表的路径列
pub const FILES_PATH: &str = "files_path";

/// 要处理的符合条件行的区间（按筛选后的顺序，从 0 开始）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectRange {
    pub start: usize,
    pub count: Option<usize>,
}

impl CollectRange {
    pub fn apply<'a>(&self, rows: &'a [InventoryRow]) -> &'a [InventoryRow] {
        let start = self.start.min(rows.len());
        let end = match self.count {
            Some(count) => start.saturating_add(count).min(rows.len()),
            None => rows.len(),
        };
        &rows[start..end]
    }
}

/// 采集统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectReport {
    pub processed: usize,
    pub accessible: usize,
    pub pdfs: usize,
}

/// 采集器
pub struct Collector<'a> {
    pub data_root: PathBuf,
    pub probe: &'a dyn UrlProbe,
    pub capture: &'a dyn PageCapture,
    pub output: &'a dyn OutputStore,
}

impl Collector<'_> {
    /// 依次采集，每行处理完立即写入结果表
    ///
    /// # 返回
    /// 结果表写入失败时立即停止并返回错误
    pub async fn collect(&self, rows: &[InventoryRow]) -> Result<CollectReport, StoreError> {
        let mut report = CollectReport::default();

        for (i, row) in rows.iter().enumerate() {
            info!("\n[{}/{}] Inventory row {}", i + 1, rows.len(), row.row);
            info!("  URL: {}", row.url);
            info!("  Title: {}", row.title);

            let (status, folder) = self.collect_one(row, &mut report).await;

            let values = vec![
                (fields::SOURCE_URL.to_string(), row.url.clone()),
                (fields::TITLE.to_string(), row.title.clone()),
                (fields::AGENCY.to_string(), row.office.clone()),
                (fields::AGENCY2.to_string(), row.agency.clone()),
                (fields::STATUS.to_string(), status),
                (
                    FILES_PATH.to_string(),
                    folder
                        .map(|f| f.display().to_string())
                        .unwrap_or_default(),
                ),
            ];
            let key = Some(row.url.as_str()).filter(|url| !url.is_empty());
            let action = self.output.upsert(key, &values)?;
            info!("  Saved to output ({:?})", action);
            report.processed += 1;
        }

        Ok(report)
    }

    async fn collect_one(
        &self,
        row: &InventoryRow,
        report: &mut CollectReport,
    ) -> (String, Option<PathBuf>) {
        let folder = if row.title.is_empty() {
            warn!("  No title available, skipping folder creation");
            None
        } else {
            match prepare_title_folder(&self.data_root, &row.title) {
                Ok(folder) => Some(folder),
                Err(e) => {
                    warn!("  Could not create folder for title: {}", e);
                    None
                }
            }
        };

        if !row.url.starts_with("http") {
            warn!("  ✗ Invalid URL");
            return ("Invalid URL".to_string(), folder);
        }

        if let Err(status) = self.probe.access(&row.url).await {
            warn!("  ✗ Status: {}", status);
            return (status, folder);
        }
        report.accessible += 1;
        info!("  ✓ Status: Success");

        let Some(dir) = folder.as_ref() else {
            warn!("  ✗ No folder available for PDF");
            return ("Success".to_string(), folder);
        };

        let pdf_path = dir.join(format!("{}.pdf", sanitize_folder_name(&row.title)));
        let status = match self.capture.save_pdf(&row.url, &pdf_path).await {
            Ok(snapshot) => {
                report.pdfs += 1;
                info!("  ✓ PDF saved: {}", pdf_path.display());
                format!("Success; {}", snapshot.status())
            }
            Err(e) => {
                warn!("  ✗ Failed to save PDF: {}", e);
                format!("Success; ERROR: Could not convert URL to PDF: {}", e)
            }
        };
        (status, folder)
    }
}

/// `collect` 命令入口
pub async fn run_collect(config: &Config, range: CollectRange) -> AppResult<CollectReport> {
    let settings = &config.collect;
    info!("Reading inventory: {}", settings.inventory_csv.display());
    let table = CsvTable::load(&settings.inventory_csv)?;
    info!("Total rows in inventory: {}", table.rows.len());

    let (columns, eligible) = eligible_rows(&table)?;
    info!("Eligible rows after filtering: {}", eligible.len());
    info!(
        "Columns: title={:?} office={:?} agency={:?}",
        columns.title.map(|c| &table.headers[c]),
        columns.office.map(|c| &table.headers[c]),
        columns.agency.map(|c| &table.headers[c]),
    );

    let rows = range.apply(&eligible);
    if rows.is_empty() {
        warn!("⚠️ No eligible rows in the requested range");
        return Ok(CollectReport::default());
    }

    let output = CsvOutputStore::new(&settings.output_csv, fields::SOURCE_URL);
    output.probe().map_err(|e| ConfigError::OutputNotWritable {
        path: settings.output_csv.clone(),
        reason: e.to_string(),
    })?;

    let probe = HttpProbe::new(settings.access_timeout_secs)
        .map_err(|e| ConfigError::Invalid(format!("HTTP client could not be built: {}", e)))?;
    let capture = BrowserCapture::launch(&config.browser, settings.page_timeout_secs).await?;

    let collector = Collector {
        data_root: settings.data_root.clone(),
        probe: &probe,
        capture: &capture,
        output: &output,
    };
    let result = collector.collect(rows).await;
    capture.close().await;

    let report = result?;
    info!("\n{}", "=".repeat(60));
    info!("Processing complete! {} rows processed.", report.processed);
    info!("Output saved to: {}", settings.output_csv.display());
    Ok(report)
}
