//! 手动录入日志 - 业务能力层
//!
//! 只负责"记录写回失败的值"，供操作员事后手动填入输入表

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

/// 手动录入日志
///
/// 职责：
/// - 追加写回失败的 行号 / 字段 / 值
/// - 不关心重试流程
pub struct ManualEntryLog {
    path: String,
}

impl ManualEntryLog {
    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 追加一条记录
    ///
    /// # 参数
    /// - `row`: 输入表行号
    /// - `field`: 列名
    /// - `value`: 需要手动填入的值
    pub fn record(&self, row: usize, field: &str, value: &str) -> std::io::Result<()> {
        debug!("Manual entry: row {} | {} = {}", row, field, value);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let line = format!(
            "{}\trow {}\t{}\t{}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            row,
            field,
            value
        );
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl Default for ManualEntryLog {
    fn default() -> Self {
        Self::with_path("manual_entry.txt")
    }
}
