//! 行记录
//!
//! 输入表格中的一行数据。空字符串 `""` 和单个空格 `" "` 都视为“缺失”，
//! 这是历史表格遗留的约定，只在读取边界处统一转换为 `None`。

/// 输入表格列名
pub mod fields {
    pub const TITLE: &str = "4_title";
    pub const PRE_TITLE: &str = "4_pre_title";
    pub const AGENCY: &str = "5_agency";
    pub const AGENCY2: &str = "5_agency2";
    pub const SUMMARY: &str = "6_summary_description";
    pub const SOURCE_URL: &str = "7_original_distribution_url";
    pub const SUBJECT_TERMS1: &str = "8_subject_terms1";
    pub const SUBJECT_TERMS2: &str = "8_subject_terms2";
    pub const KEYWORDS: &str = "8_keywords";
    pub const GEOGRAPHIC_COVERAGE: &str = "9_geographic_coverage";
    pub const TIME_START: &str = "10_time_period1";
    pub const TIME_END: &str = "10_time_period2";
    pub const DATA_TYPES: &str = "11_data_types";
    pub const COLLECTION_NOTES: &str = "12_collection_notes";
    pub const DOWNLOAD_DATE: &str = "12_download_date_original_source";
    pub const UPLOAD_PATH: &str = "path";
    pub const WORKSPACE_ID: &str = "datalumos_id";

    // 输出表派生列
    pub const STATUS: &str = "Status";
    pub const KEYWORDS_ENTERED: &str = "keywords_entered";
    pub const FILE_EXTENSIONS: &str = "file_extensions";
    pub const DATASET_ROWS: &str = "dataset_rows";
    pub const DATASET_COLUMNS: &str = "dataset_columns";
    pub const DATASET_SIZE: &str = "dataset_size";
    pub const PROCESSED_AT: &str = "processed_at";
}

/// 将原始单元格内容规范化为可选值
pub fn normalize_cell(raw: &str) -> Option<String> {
    if raw.is_empty() || raw == " " {
        None
    } else {
        Some(raw.to_string())
    }
}

/// 一行输入数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// 行号（从 1 开始，不含表头）
    pub row: usize,
    columns: Vec<(String, Option<String>)>,
}

impl Record {
    /// 由表头和原始单元格构建记录，缺少的单元格视为缺失
    pub fn from_raw(row: usize, headers: &[String], cells: &[String]) -> Self {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = cells.get(i).and_then(|c| normalize_cell(c));
                (name.clone(), value)
            })
            .collect();
        Self { row, columns }
    }

    /// 读取字段值；不存在的列与缺失值同样返回 `None`
    pub fn get(&self, field: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// 按原列顺序遍历所有列
    pub fn columns(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    /// 来源 URL（输出表的自然键）
    pub fn source_url(&self) -> Option<&str> {
        self.get(fields::SOURCE_URL)
    }

    /// 项目标题：有前置标题时拼接为 “前置标题 标题”
    pub fn project_title(&self) -> Option<String> {
        let title = self.get(fields::TITLE)?;
        Some(match self.get(fields::PRE_TITLE) {
            Some(pre) => format!("{} {}", pre, title),
            None => title.to_string(),
        })
    }

    /// 采集说明：说明文字加下载日期
    pub fn collection_notes(&self) -> Option<String> {
        let date = self
            .get(fields::DOWNLOAD_DATE)
            .map(|d| format!("(Downloaded {})", d));
        match (self.get(fields::COLLECTION_NOTES), date) {
            (Some(notes), Some(date)) => Some(format!("{} {}", notes, date)),
            (Some(notes), None) => Some(notes.to_string()),
            (None, Some(date)) => Some(date),
            (None, None) => None,
        }
    }
}
