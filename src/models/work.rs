//! 工作条目、批次与处理结果

use std::fmt;

/// 一个待处理条目：输入表中的行号（从 1 开始，不含表头）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItem {
    pub row: usize,
}

impl WorkItem {
    pub fn new(row: usize) -> Self {
        Self { row }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.row)
    }
}

/// 一个批次：在同一个浏览器会话中处理的一组条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 批次序号，仅用于日志
    pub seq: usize,
    pub items: Vec<WorkItem>,
}

/// 将条目按固定大小切分为连续批次
pub fn partition(items: &[WorkItem], batch_size: usize) -> Vec<Batch> {
    let size = batch_size.max(1);
    items
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| Batch {
            seq: i + 1,
            items: chunk.to_vec(),
        })
        .collect()
}

/// 单个步骤的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Completed,
    Skipped(String),
    Warning(String),
    FatalError(String),
}

impl StepResult {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StepResult::FatalError(_))
    }
}

/// 行处理的最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RowStatus::Success => "Success",
            RowStatus::PartialSuccess => "Partial",
            RowStatus::Failed => "Failed",
        };
        f.write_str(text)
    }
}

/// 行处理结果汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowOutcome {
    pub row: usize,
    /// 工作区 ID（关联 ID）
    pub correlation_id: Option<String>,
    pub source_url: Option<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl RowOutcome {
    pub fn new(row: usize) -> Self {
        Self {
            row,
            ..Default::default()
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn status(&self) -> RowStatus {
        if !self.errors.is_empty() {
            if self.correlation_id.is_some() {
                RowStatus::PartialSuccess
            } else {
                RowStatus::Failed
            }
        } else if !self.warnings.is_empty() {
            RowStatus::PartialSuccess
        } else {
            RowStatus::Success
        }
    }

    /// 写入输出表 status 列的文字
    pub fn status_message(&self) -> String {
        match (self.status(), self.errors.first()) {
            (RowStatus::Success, _) => "Success".to_string(),
            (status, Some(first)) => format!("{}: {}", status, first),
            (status, None) => format!("{}: {} warning(s)", status, self.warnings.len()),
        }
    }

    /// 每行固定输出的摘要：一行概要 + 缩进的错误 / 警告
    pub fn summary_lines(&self, ordinal: usize) -> Vec<String> {
        let mut lines = vec![format!(
            "[{}] row {} | workspace {} | {}",
            ordinal,
            self.row,
            self.correlation_id.as_deref().unwrap_or("N/A"),
            self.source_url.as_deref().unwrap_or("N/A"),
        )];
        lines.extend(self.errors.iter().map(|e| format!("    ERROR: {}", e)));
        lines.extend(self.warnings.iter().map(|w| format!("    WARNING: {}", w)));
        lines
    }
}
