//! 上传目录检查（`audit` 命令）
//!
//! 列出上传根目录下文件数量不等于预期值的子目录，并从结果表中按路径查出
//! 对应的来源 URL 和工作区 ID，写成制表符分隔的日志。

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppResult, ConfigError, StoreError};
use crate::models::fields;
use crate::services::tabular::missing_columns;
use crate::services::CsvTable;
use crate::workflow::steps::upload_dir;

const NOT_FOUND: &str = "NOT FOUND";
const NOT_SET: &str = "N/A";

/// 一个文件数量不符合预期的目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub folder_name: String,
    pub folder_path: PathBuf,
    pub file_count: usize,
    pub url: String,
    pub workspace_id: String,
}

impl AuditEntry {
    fn log_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.folder_name, self.file_count, self.url, self.workspace_id
        )
    }
}

/// 表中 `path` 列解析后的目录 → (URL, 工作区 ID)
fn path_index(root: &Path, table: &CsvTable) -> Vec<(PathBuf, String, String)> {
    let (Some(path_col), Some(url_col), Some(id_col)) = (
        table.column(fields::UPLOAD_PATH),
        table.column(fields::SOURCE_URL),
        table.column(fields::WORKSPACE_ID),
    ) else {
        return Vec::new();
    };

    (0..table.rows.len())
        .filter_map(|idx| {
            let raw = table.cell(idx, path_col)?.trim();
            if raw.is_empty() {
                return None;
            }
            let dir = if Path::new(raw).is_absolute() {
                PathBuf::from(raw)
            } else {
                upload_dir(root, raw)
            };
            let url = table.cell(idx, url_col).unwrap_or_default().trim().to_string();
            let id = format_workspace_id(table.cell(idx, id_col).unwrap_or_default());
            Some((dir, url, id))
        })
        .collect()
}

/// 工作区 ID 可能被表格软件存成 `239104.0`
fn format_workspace_id(raw: &str) -> String {
    let id = raw.trim();
    if id.is_empty() {
        return NOT_SET.to_string();
    }
    id.strip_suffix(".0").unwrap_or(id).to_string()
}

fn same_dir(a: &Path, b: &Path) -> bool {
    let norm = |p: &Path| p.to_string_lossy().replace('\\', "/");
    norm(a) == norm(b)
}

/// 查找文件数量不等于 `expected` 的子目录（按目录名排序）
///
/// # 参数
/// - `root`: 上传根目录
/// - `table`: 含 `path`、来源 URL 和工作区 ID 列的结果表
/// - `expected`: 每个目录预期的条目数
pub fn find_incomplete_folders(
    root: &Path,
    table: &CsvTable,
    expected: usize,
) -> Result<Vec<AuditEntry>, StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: root.to_path_buf(),
        source,
    };
    let index = path_index(root, table);

    let mut folders: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(root).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            folders.push(path);
        }
    }
    folders.sort();

    let mut entries = Vec::new();
    for folder in folders {
        let file_count = fs::read_dir(&folder)
            .map_err(|source| StoreError::Io {
                path: folder.clone(),
                source,
            })?
            .count();
        if file_count == expected {
            continue;
        }

        let (url, workspace_id) = index
            .iter()
            .find(|(dir, _, _)| same_dir(dir, &folder))
            .map(|(_, url, id)| (url.clone(), id.clone()))
            .unwrap_or_else(|| (NOT_FOUND.to_string(), NOT_FOUND.to_string()));

        entries.push(AuditEntry {
            folder_name: folder
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            folder_path: folder,
            file_count,
            url,
            workspace_id,
        });
    }
    Ok(entries)
}

/// 写入检查日志
pub fn write_audit_log(path: &Path, entries: &[AuditEntry]) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(path).map_err(io_err)?;
    writeln!(file, "Folder Name\tNumber of Files\tURL\tdatalumos_id").map_err(io_err)?;
    writeln!(file, "{}", "-".repeat(100)).map_err(io_err)?;
    for entry in entries {
        writeln!(file, "{}", entry.log_line()).map_err(io_err)?;
    }
    Ok(())
}

/// `audit` 命令入口
pub fn run_audit(config: &Config) -> AppResult<Vec<AuditEntry>> {
    let root = &config.upload_root;
    if !root.is_dir() {
        return Err(ConfigError::Invalid(format!(
            "upload root {} does not exist",
            root.display()
        ))
        .into());
    }

    info!("Reading CSV file: {}", config.input_csv.display());
    let table = CsvTable::load(&config.input_csv)?;
    let missing = missing_columns(
        &table,
        &[fields::UPLOAD_PATH, fields::SOURCE_URL, fields::WORKSPACE_ID],
    );
    if !missing.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "{} is missing column(s): {}",
            config.input_csv.display(),
            missing.join(", ")
        ))
        .into());
    }

    info!("Scanning subfolders in: {}", root.display());
    let entries = find_incomplete_folders(root, &table, config.expected_upload_files)?;
    info!(
        "Found {} subfolder(s) without exactly {} file(s)",
        entries.len(),
        config.expected_upload_files
    );
    for entry in &entries {
        warn!(
            "  {}: {} files, URL: {}, datalumos_id: {}",
            entry.folder_name, entry.file_count, entry.url, entry.workspace_id
        );
    }

    write_audit_log(&config.audit.log_file, &entries)?;
    info!("Results written to: {}", config.audit.log_file.display());
    Ok(entries)
}
