//! 上传数据集统计
//!
//! 根据实际上传的文件计算输出表中的数据集行数、列数和总大小。
//! 行列数只统计 CSV 文件，大小统计全部文件。

use std::path::{Path, PathBuf};
use tracing::debug;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// 一行上传文件的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatasetStats {
    /// 所有 CSV 文件的数据行数之和（不含表头）
    pub rows: Option<u64>,
    /// CSV 文件中最多的列数
    pub columns: Option<usize>,
    /// 所有可读文件的字节数之和
    pub bytes: Option<u64>,
}

impl DatasetStats {
    pub fn from_files(files: &[PathBuf]) -> Self {
        let mut stats = Self::default();
        for file in files {
            match std::fs::metadata(file) {
                Ok(meta) => *stats.bytes.get_or_insert(0) += meta.len(),
                Err(e) => debug!("Could not stat {}: {}", file.display(), e),
            }
            if !is_csv(file) {
                continue;
            }
            match count_csv(file) {
                Ok((rows, columns)) => {
                    *stats.rows.get_or_insert(0) += rows;
                    let widest = stats.columns.get_or_insert(0);
                    *widest = (*widest).max(columns);
                }
                Err(e) => debug!("Could not count rows of {}: {}", file.display(), e),
            }
        }
        stats
    }

    pub fn rows_text(&self) -> String {
        self.rows.map(|n| n.to_string()).unwrap_or_default()
    }

    pub fn columns_text(&self) -> String {
        self.columns.map(|n| n.to_string()).unwrap_or_default()
    }

    pub fn size_text(&self) -> String {
        self.bytes.map(human_size).unwrap_or_default()
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case("csv"))
}

/// 返回（数据行数，最大列数）
fn count_csv(path: &Path) -> Result<(u64, usize), csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut columns = reader.headers()?.len();
    let mut rows = 0;
    for record in reader.records() {
        columns = columns.max(record?.len());
        rows += 1;
    }
    Ok((rows, columns))
}

/// 按 1024 进位的可读大小，例如 `16 B`、`1.5 KB`
pub fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, SIZE_UNITS[unit])
}
