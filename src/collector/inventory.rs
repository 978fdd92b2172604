//! 机构数据清单
//!
//! 清单按列位置筛选：B 列为空（尚未认领）、L 列为空（尚未处理）、
//! G 列以 `https://data.cdc.gov` 开头。标题 / 处室 / 机构列按表头模糊查找。

use crate::error::ConfigError;
use crate::services::CsvTable;
use crate::utils::{column_letter, find_column};

pub const CDC_PREFIX: &str = "https://data.cdc.gov";

const CLAIMED_COL: usize = 1; // B
const URL_COL: usize = 6; // G
const DONE_COL: usize = 11; // L

const TITLE_CANDIDATES: &[&str] = &["Title of Site", "Title", "Site Title"];
const OFFICE_CANDIDATES: &[&str] = &["Office"];
const AGENCY_CANDIDATES: &[&str] = &["Agency"];

/// 清单中一条待采集的数据页
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRow {
    /// 清单中的行号（从 1 开始，不含表头）
    pub row: usize,
    pub url: String,
    pub title: String,
    pub office: String,
    pub agency: String,
}

/// 找到的列位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryColumns {
    pub title: Option<usize>,
    pub office: Option<usize>,
    pub agency: Option<usize>,
}

impl InventoryColumns {
    pub fn discover(headers: &[String]) -> Self {
        Self {
            title: find_column(headers, TITLE_CANDIDATES),
            office: find_column(headers, OFFICE_CANDIDATES),
            agency: find_column(headers, AGENCY_CANDIDATES),
        }
    }
}

fn blank(cell: Option<&str>) -> bool {
    cell.map_or(true, |c| c.trim().is_empty())
}

fn text(table: &CsvTable, idx: usize, col: Option<usize>) -> String {
    col.and_then(|c| table.cell(idx, c))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// 筛选出待采集的行
///
/// # 返回
/// 按清单顺序返回符合条件的行；清单不足 12 列时返回配置错误
pub fn eligible_rows(table: &CsvTable) -> Result<(InventoryColumns, Vec<InventoryRow>), ConfigError> {
    if table.headers.len() <= DONE_COL {
        return Err(ConfigError::Invalid(format!(
            "inventory needs columns A-{} but has only {}",
            column_letter(DONE_COL),
            table.headers.len()
        )));
    }

    let columns = InventoryColumns::discover(&table.headers);
    let rows = (0..table.rows.len())
        .filter(|&idx| {
            blank(table.cell(idx, CLAIMED_COL))
                && blank(table.cell(idx, DONE_COL))
                && table
                    .cell(idx, URL_COL)
                    .is_some_and(|url| url.starts_with(CDC_PREFIX))
        })
        .map(|idx| InventoryRow {
            row: idx + 1,
            url: text(table, idx, Some(URL_COL)),
            title: text(table, idx, columns.title),
            office: text(table, idx, columns.office),
            agency: text(table, idx, columns.agency),
        })
        .collect();

    Ok((columns, rows))
}
