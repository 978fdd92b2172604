//! 采集命令：清单筛选 → 目录 → 可访问性 → PDF → 结果表

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use datalumos_batch::collector::{
    eligible_rows, CollectRange, Collector, PageCapture, PageSnapshot, UrlProbe, FILES_PATH,
};
use datalumos_batch::error::DriverError;
use datalumos_batch::models::fields;
use datalumos_batch::services::{CsvOutputStore, CsvTable};

/// 预设状态的探测器：不在表中的 URL 都可访问
#[derive(Default)]
struct StubProbe {
    failures: HashMap<String, String>,
}

#[async_trait]
impl UrlProbe for StubProbe {
    async fn access(&self, url: &str) -> Result<(), String> {
        match self.failures.get(url) {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }
}

/// 写一个占位 PDF 的抓取器
#[derive(Default)]
struct StubCapture {
    broken: Vec<String>,
    saved: Mutex<Vec<String>>,
}

#[async_trait]
impl PageCapture for StubCapture {
    async fn save_pdf(&self, url: &str, pdf_path: &Path) -> Result<PageSnapshot, DriverError> {
        if self.broken.iter().any(|b| b == url) {
            return Err(DriverError::Browser("page crashed".into()));
        }
        std::fs::write(pdf_path, b"%PDF-1.4")?;
        self.saved.lock().unwrap().push(url.to_string());
        Ok(PageSnapshot {
            expanded: 1,
            rows_per_page_set: true,
            total_rows: Some(250),
        })
    }
}

/// 12 列清单（A-L），列位置与真实清单一致
fn inventory(rows: &[(&str, &str, &str, &str)]) -> CsvTable {
    let headers = [
        "Agency", "Claimed", "Office", "Title of Site", "Notes", "Type", "URL", "H", "I", "J",
        "K", "Done",
    ];
    CsvTable {
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows: rows
            .iter()
            .map(|(claimed, title, url, done)| {
                let mut cells = vec![String::new(); headers.len()];
                cells[0] = "CDC".into();
                cells[1] = claimed.to_string();
                cells[2] = "NCHS".into();
                cells[3] = title.to_string();
                cells[6] = url.to_string();
                cells[11] = done.to_string();
                cells
            })
            .collect(),
    }
}

fn read_rows(path: &Path) -> Vec<HashMap<String, String>> {
    let table = CsvTable::load(path).unwrap();
    (0..table.rows.len())
        .map(|idx| {
            table
                .headers
                .iter()
                .enumerate()
                .map(|(col, name)| {
                    (
                        name.clone(),
                        table.cell(idx, col).unwrap_or_default().to_string(),
                    )
                })
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn collects_eligible_pages_and_upserts_by_url() {
    let dir = tempfile::tempdir().unwrap();
    let data_root = dir.path().join("CDC data");
    let output_path = dir.path().join("collected.csv");

    let table = inventory(&[
        ("", "Flu: Weekly", "https://data.cdc.gov/flu", ""),
        ("someone", "Claimed", "https://data.cdc.gov/claimed", ""),
        ("", "Gone", "https://data.cdc.gov/gone", ""),
        ("", "Broken", "https://data.cdc.gov/broken", ""),
        ("", "Other site", "https://www.cdc.gov/other", ""),
    ]);
    let (_, rows) = eligible_rows(&table).unwrap();
    assert_eq!(rows.len(), 3);

    let probe = StubProbe {
        failures: HashMap::from([("https://data.cdc.gov/gone".to_string(), "HTTP 404".to_string())]),
    };
    let capture = StubCapture {
        broken: vec!["https://data.cdc.gov/broken".to_string()],
        ..Default::default()
    };
    let output = CsvOutputStore::new(&output_path, fields::SOURCE_URL);
    let collector = Collector {
        data_root: data_root.clone(),
        probe: &probe,
        capture: &capture,
        output: &output,
    };

    let report = collector.collect(&rows).await.unwrap();
    assert_eq!((report.processed, report.accessible, report.pdfs), (3, 2, 1));

    let out = read_rows(&output_path);
    assert_eq!(out.len(), 3);
    assert_eq!(
        out[0][fields::STATUS],
        "Success; Set to 100 (Note: 250 total rows > 100)"
    );
    assert_eq!(out[0][fields::AGENCY], "NCHS");
    assert_eq!(out[0][fields::AGENCY2], "CDC");
    assert_eq!(out[1][fields::STATUS], "HTTP 404");
    assert!(out[2][fields::STATUS].starts_with("Success; ERROR: Could not convert URL to PDF"));

    let flu_dir = data_root.join("Flu_ Weekly");
    assert_eq!(out[0][FILES_PATH], flu_dir.display().to_string());
    assert!(flu_dir.join("Flu_ Weekly.pdf").is_file());

    // 再次运行只更新已有行
    collector.collect(&rows[..1]).await.unwrap();
    assert_eq!(read_rows(&output_path).len(), 3);
}

#[tokio::test]
async fn range_selects_slice_of_eligible_rows() {
    let table = inventory(&[
        ("", "A", "https://data.cdc.gov/a", ""),
        ("", "B", "https://data.cdc.gov/b", ""),
        ("", "C", "https://data.cdc.gov/c", "done"),
        ("", "D", "https://data.cdc.gov/d", ""),
    ]);
    let (_, rows) = eligible_rows(&table).unwrap();

    let range = CollectRange {
        start: 1,
        count: Some(5),
    };
    let titles: Vec<&str> = range.apply(&rows).iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["B", "D"]);
}
