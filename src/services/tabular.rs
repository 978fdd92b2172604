//! 表格文件服务 - 业务能力层
//!
//! ## 职责
//!
//! - `RowSource`：按行号读取输入表的一行，并把工作区 ID 写回该行
//! - `OutputStore`：按自然键（来源 URL）更新或追加输出表的一行
//! - `write_back_with_retry`：写回失败时有限次重试，仍失败则记录待手动录入
//!
//! 每次读取都重新打开文件，每次修改都立即整表写回磁盘。

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::Record;
use crate::services::manual_entry::ManualEntryLog;
use crate::services::operator::Operator;

const BOM: char = '\u{feff}';

/// 输入表
pub trait RowSource: Send + Sync {
    /// 读取第 `row` 行（从 1 开始，不含表头）
    fn read(&self, row: usize) -> Result<Record, StoreError>;

    /// 更新第 `row` 行的单个字段；列不存在时追加该列
    fn write_back(&self, row: usize, field: &str, value: &str) -> Result<(), StoreError>;
}

/// 输出表
pub trait OutputStore: Send + Sync {
    /// 按键更新或追加一行
    ///
    /// # 参数
    /// - `key`: 自然键的值；为 `None` 时总是追加
    /// - `fields`: 需要写入的字段（按给定顺序，新列追加到末尾）
    fn upsert(
        &self,
        key: Option<&str>,
        fields: &[(String, String)],
    ) -> Result<UpsertAction, StoreError>;
}

/// upsert 的实际动作，附带数据行号（从 1 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Updated(usize),
    Appended(usize),
}

/// 内存中的整张 CSV 表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// 读取 CSV 文件，容忍 BOM 和长短不一的行
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, content.trim_start_matches(BOM))
    }

    /// 读取 CSV 文件；文件不存在时返回空表
    pub fn load_or_empty(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn parse(path: &Path, content: &str) -> Result<Self, StoreError> {
        let csv_err = |source| StoreError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    /// 整表写回：先写到同目录的临时文件，写完后再替换目标文件，
    /// 中途失败时原文件保持不变
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let csv_err = |source| StoreError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_writer(tmp.as_file_mut());
            writer.write_record(&self.headers).map_err(csv_err)?;
            let width = self.headers.len();
            for row in &self.rows {
                let mut cells = row.clone();
                if cells.len() < width {
                    cells.resize(width, String::new());
                }
                writer.write_record(&cells).map_err(csv_err)?;
            }
            writer.flush().map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// 查找列，不存在时追加到末尾
    pub fn ensure_column(&mut self, name: &str) -> usize {
        match self.column(name) {
            Some(idx) => idx,
            None => {
                self.headers.push(name.to_string());
                self.headers.len() - 1
            }
        }
    }

    pub fn set(&mut self, row_idx: usize, col: usize, value: &str) {
        let cells = &mut self.rows[row_idx];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value.to_string();
    }

    pub fn cell(&self, row_idx: usize, col: usize) -> Option<&str> {
        self.rows.get(row_idx)?.get(col).map(String::as_str)
    }

    /// 转为记录（`row` 从 1 开始）
    pub fn record(&self, row: usize) -> Option<Record> {
        let cells = self.rows.get(row.checked_sub(1)?)?;
        Some(Record::from_raw(row, &self.headers, cells))
    }
}

/// CSV 输入表
pub struct CsvRowSource {
    path: PathBuf,
}

impl CsvRowSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 数据行数
    pub fn row_count(&self) -> Result<usize, StoreError> {
        Ok(CsvTable::load(&self.path)?.rows.len())
    }
}

impl RowSource for CsvRowSource {
    fn read(&self, row: usize) -> Result<Record, StoreError> {
        let table = CsvTable::load(&self.path)?;
        table.record(row).ok_or_else(|| StoreError::RowNotFound {
            path: self.path.clone(),
            row,
            available: table.rows.len(),
        })
    }

    fn write_back(&self, row: usize, field: &str, value: &str) -> Result<(), StoreError> {
        let mut table = CsvTable::load(&self.path)?;
        if row == 0 || row > table.rows.len() {
            return Err(StoreError::RowNotFound {
                path: self.path.clone(),
                row,
                available: table.rows.len(),
            });
        }
        let col = table.ensure_column(field);
        table.set(row - 1, col, value);
        table.save(&self.path)?;
        debug!("Wrote {}={} back to row {}", field, value, row);
        Ok(())
    }
}

/// CSV 输出表，以 `key_column` 为自然键
pub struct CsvOutputStore {
    path: PathBuf,
    key_column: String,
}

impl CsvOutputStore {
    pub fn new(path: impl Into<PathBuf>, key_column: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key_column: key_column.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 运行前检查输出文件可写（不存在时创建只含表头的空表）
    pub fn probe(&self) -> Result<(), StoreError> {
        let mut table = CsvTable::load_or_empty(&self.path)?;
        table.ensure_column(&self.key_column);
        table.save(&self.path)
    }

    /// 读取整张输出表
    pub fn load(&self) -> Result<CsvTable, StoreError> {
        CsvTable::load_or_empty(&self.path)
    }
}

impl OutputStore for CsvOutputStore {
    fn upsert(
        &self,
        key: Option<&str>,
        fields: &[(String, String)],
    ) -> Result<UpsertAction, StoreError> {
        let mut table = CsvTable::load_or_empty(&self.path)?;
        let key_col = table.ensure_column(&self.key_column);

        let existing = key.and_then(|key| {
            (0..table.rows.len()).find(|&idx| table.cell(idx, key_col) == Some(key))
        });

        let (row_idx, action) = match existing {
            Some(idx) => (idx, UpsertAction::Updated(idx + 1)),
            None => {
                table.rows.push(vec![String::new(); table.headers.len()]);
                let idx = table.rows.len() - 1;
                (idx, UpsertAction::Appended(idx + 1))
            }
        };

        if let Some(key) = key {
            table.set(row_idx, key_col, key);
        }
        for (name, value) in fields {
            let col = table.ensure_column(name);
            table.set(row_idx, col, value);
        }

        table.save(&self.path)?;
        debug!("Output upsert {:?} in {}", action, self.path.display());
        Ok(action)
    }
}

/// 写回工作区 ID，失败时提示操作员释放文件后重试
///
/// 所有重试都失败时，把值打印出来并追加到手动录入日志，不会丢弃。
///
/// # 返回
/// 返回是否成功写入文件
pub async fn write_back_with_retry(
    source: &dyn RowSource,
    operator: &dyn Operator,
    manual: &ManualEntryLog,
    attempts: u32,
    row: usize,
    field: &str,
    value: &str,
) -> bool {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match source.write_back(row, field, value) {
            Ok(()) => {
                info!("[row {}] {} = {} written back", row, field, value);
                return true;
            }
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(
                    "[row {}] write-back attempt {}/{} failed: {}",
                    row, attempt, attempts, e
                );
                operator
                    .confirm(&format!(
                        "Could not write {} to row {}. Close the input file in other programs, then press Enter to retry.",
                        field, row
                    ))
                    .await;
            }
            Err(e) => {
                warn!("[row {}] write-back failed: {}", row, e);
                break;
            }
        }
    }

    println!(
        "    MANUAL ENTRY NEEDED: row {} | {} = {}",
        row, field, value
    );
    if let Err(e) = manual.record(row, field, value) {
        warn!("Manual entry log could not be written: {}", e);
    }
    false
}

/// 表中缺少的列名
pub fn missing_columns(table: &CsvTable, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|name| table.column(name).is_none())
        .map(|name| name.to_string())
        .collect()
}
