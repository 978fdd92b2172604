//! 远端登记表服务 - 业务能力层
//!
//! ## 职责
//!
//! 项目发布后，在远端登记表（Google Sheets）中按来源 URL 找到对应行，
//! 填入项目地址、标记数据已添加并把状态改为完成。
//!
//! 列位置不固定，连接时按表头名称查找（先精确后模糊）；
//! 缺少必需列时在处理任何行之前报配置错误。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::RegistrySettings;
use crate::error::{ConfigError, RegistryError};
use crate::utils::columns::{column_letter, find_column};

/// 远端表格的最小读写能力
#[async_trait]
pub trait RegistryTable: Send + Sync {
    /// 读取整张表（第一行为表头）
    async fn fetch_rows(&self) -> Result<Vec<Vec<String>>, RegistryError>;

    /// 写入同一行的若干单元格
    ///
    /// # 参数
    /// - `sheet_row`: 表格行号（从 1 开始，表头为第 1 行）
    /// - `cells`: (列下标, 值)
    async fn write_cells(
        &self,
        sheet_row: usize,
        cells: &[(usize, String)],
    ) -> Result<(), RegistryError>;
}

/// 必需列及其候选表头
const KEY_CANDIDATES: &[&str] = &["URL", "Original Distribution URL", "Source URL"];
const LOCATION_CANDIDATES: &[&str] = &["Download Location"];
const ADDED_CANDIDATES: &[&str] = &["Data Added"];
const STATUS_CANDIDATES: &[&str] = &["Status"];

/// 表头查找结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryColumns {
    pub key: usize,
    pub location: usize,
    pub data_added: usize,
    pub status: usize,
}

impl RegistryColumns {
    /// 从表头查找所有必需列
    pub fn discover(headers: &[String]) -> Result<Self, ConfigError> {
        let lookups = [
            ("URL", find_column(headers, KEY_CANDIDATES)),
            ("Download Location", find_column(headers, LOCATION_CANDIDATES)),
            ("Data Added", find_column(headers, ADDED_CANDIDATES)),
            ("Status", find_column(headers, STATUS_CANDIDATES)),
        ];
        let missing: Vec<String> = lookups
            .iter()
            .filter(|(_, idx)| idx.is_none())
            .map(|(name, _)| name.to_string())
            .collect();

        // 四列必须各不相同
        for (i, (name, idx)) in lookups.iter().enumerate() {
            let Some(col) = idx else { continue };
            if let Some((other, _)) = lookups[..i].iter().find(|(_, o)| o == idx) {
                return Err(ConfigError::Invalid(format!(
                    "Registry columns '{}' and '{}' both resolve to column {}",
                    other,
                    name,
                    column_letter(*col)
                )));
            }
        }

        match lookups {
            [(_, Some(key)), (_, Some(location)), (_, Some(data_added)), (_, Some(status))] => {
                Ok(Self {
                    key,
                    location,
                    data_added,
                    status,
                })
            }
            _ => Err(ConfigError::MissingRegistryColumns { missing }),
        }
    }
}

/// 登记表更新器
pub struct RegistryUpdater {
    table: Box<dyn RegistryTable>,
    columns: RegistryColumns,
}

impl RegistryUpdater {
    /// 连接并校验表头
    pub async fn connect(table: Box<dyn RegistryTable>) -> Result<Self, ConfigError> {
        let rows = table
            .fetch_rows()
            .await
            .map_err(|e| ConfigError::RegistryUnavailable(e.to_string()))?;
        let headers = rows.first().cloned().unwrap_or_default();
        let columns = RegistryColumns::discover(&headers)?;
        debug!("Registry columns: {:?}", columns);
        Ok(Self { table, columns })
    }

    pub fn columns(&self) -> RegistryColumns {
        self.columns
    }

    /// 标记一个已发布的项目
    ///
    /// # 参数
    /// - `source_url`: 来源 URL（登记表的键）
    /// - `project_url`: 发布后的项目地址
    ///
    /// # 返回
    /// 返回更新的表格行号
    pub async fn mark_published(
        &self,
        source_url: &str,
        project_url: &str,
    ) -> Result<usize, RegistryError> {
        let rows = self.table.fetch_rows().await?;
        let wanted = source_url.trim();
        let idx = rows
            .iter()
            .skip(1)
            .position(|row| {
                row.get(self.columns.key)
                    .is_some_and(|cell| cell.trim() == wanted)
            })
            .ok_or_else(|| RegistryError::KeyNotFound(source_url.to_string()))?;
        // 表头占第 1 行
        let sheet_row = idx + 2;

        self.table
            .write_cells(
                sheet_row,
                &[
                    (self.columns.location, project_url.to_string()),
                    (self.columns.data_added, "Y".to_string()),
                    (self.columns.status, "Done".to_string()),
                ],
            )
            .await?;
        info!("Registry row {} marked as done", sheet_row);
        Ok(sheet_row)
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Google Sheets values 接口
pub struct SheetsRegistry {
    client: reqwest::Client,
    settings: RegistrySettings,
}

impl SheetsRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    fn range(&self, a1: &str) -> String {
        format!("'{}'!{}", self.settings.sheet_name, a1)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RegistryError::BadResponse {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl RegistryTable for SheetsRegistry {
    async fn fetch_rows(&self) -> Result<Vec<Vec<String>>, RegistryError> {
        let url = format!(
            "{}/spreadsheets/{}/values/{}",
            self.settings.api_base,
            self.settings.spreadsheet_id,
            self.settings.sheet_name.replace(' ', "%20")
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.settings.access_token)
            .send()
            .await?;
        let range: ValueRange = Self::check(response).await?.json().await?;
        Ok(range.values)
    }

    async fn write_cells(
        &self,
        sheet_row: usize,
        cells: &[(usize, String)],
    ) -> Result<(), RegistryError> {
        let data: Vec<_> = cells
            .iter()
            .map(|(col, value)| {
                json!({
                    "range": self.range(&format!("{}{}", column_letter(*col), sheet_row)),
                    "values": [[value]],
                })
            })
            .collect();
        let url = format!(
            "{}/spreadsheets/{}/values:batchUpdate",
            self.settings.api_base, self.settings.spreadsheet_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.access_token)
            .json(&json!({ "valueInputOption": "RAW", "data": data }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
