//! 行选择
//!
//! 两种互斥的方式：连续闭区间（`--start-row/--end-row`），
//! 或逗号分隔的行号 / 区间列表（`--rows "1,3,5,7-10"`，去重并升序）。

use std::collections::BTreeSet;

use crate::error::ConfigError;
use crate::models::WorkItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSelection {
    Range { start: usize, end: usize },
    List(Vec<usize>),
}

impl RowSelection {
    /// 构建闭区间选择
    pub fn range(start: usize, end: usize) -> Result<Self, ConfigError> {
        let text = format!("{}-{}", start, end);
        if start == 0 {
            return Err(invalid(&text, "row numbers start at 1"));
        }
        if end < start {
            return Err(invalid(&text, "end row is before start row"));
        }
        Ok(RowSelection::Range { start, end })
    }

    /// 解析 `"1,3,5,7-10"` 形式的列表
    pub fn parse_list(input: &str) -> Result<Self, ConfigError> {
        let mut rows = BTreeSet::new();

        for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((a, b)) => {
                    let start = parse_row(input, a)?;
                    let end = parse_row(input, b)?;
                    if end < start {
                        return Err(invalid(input, &format!("range '{}' is reversed", part)));
                    }
                    rows.extend(start..=end);
                }
                None => {
                    rows.insert(parse_row(input, part)?);
                }
            }
        }

        if rows.is_empty() {
            return Err(invalid(input, "no rows selected"));
        }
        Ok(RowSelection::List(rows.into_iter().collect()))
    }

    /// 展开为有序的行号列表
    pub fn rows(&self) -> Vec<usize> {
        match self {
            RowSelection::Range { start, end } => (*start..=*end).collect(),
            RowSelection::List(rows) => rows.clone(),
        }
    }

    pub fn work_items(&self) -> Vec<WorkItem> {
        self.rows().into_iter().map(WorkItem::new).collect()
    }
}

fn parse_row(input: &str, raw: &str) -> Result<usize, ConfigError> {
    let row: usize = raw
        .trim()
        .parse()
        .map_err(|_| invalid(input, &format!("'{}' is not a row number", raw.trim())))?;
    if row == 0 {
        return Err(invalid(input, "row numbers start at 1"));
    }
    Ok(row)
}

fn invalid(input: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidRows {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
