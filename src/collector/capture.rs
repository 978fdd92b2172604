//! 数据页抓取
//!
//! - `UrlProbe`：检查 URL 是否可访问（HTTP 200）
//! - `PageCapture`：在浏览器中打开数据页，展开折叠内容、把分页调到每页 100 行，然后打印为 PDF

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::browser::{launch_or_connect, BrowserHandle};
use crate::config::BrowserSettings;
use crate::error::DriverError;
use crate::infrastructure::{ChromePageDriver, PageDriver};

/// URL 可访问性检查
#[async_trait]
pub trait UrlProbe: Send + Sync {
    /// 可访问返回 `Ok`，否则返回简短的状态说明
    async fn access(&self, url: &str) -> Result<(), String>;
}

/// reqwest 实现
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlProbe for HttpProbe {
    async fn access(&self, url: &str) -> Result<(), String> {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => Ok(()),
            Ok(resp) => Err(format!("HTTP {}", resp.status().as_u16())),
            Err(e) if e.is_timeout() => Err("Timeout".to_string()),
            Err(e) if e.is_connect() => Err("Connection Error".to_string()),
            Err(e) if e.is_redirect() => Err("Too Many Redirects".to_string()),
            Err(e) => Err(format!("Error: {}", e)),
        }
    }
}

/// 生成 PDF 时对分页控件的处理结果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageSnapshot {
    /// 展开的"Read more"等折叠块数量
    pub expanded: u64,
    /// 成功把分页调到每页 100 行
    pub rows_per_page_set: bool,
    /// 分页控件显示的总行数
    pub total_rows: Option<u64>,
}

impl PageSnapshot {
    /// 写入状态列的说明
    pub fn status(&self) -> String {
        match (self.rows_per_page_set, self.total_rows) {
            (true, Some(total)) if total > 100 => {
                format!("Set to 100 (Note: {} total rows > 100)", total)
            }
            (true, Some(_)) => "Set to 100".to_string(),
            (true, None) => "Set to 100 (count unknown)".to_string(),
            (false, _) => "PDF generated".to_string(),
        }
    }
}

/// 数据页 PDF 抓取
#[async_trait]
pub trait PageCapture: Send + Sync {
    async fn save_pdf(&self, url: &str, pdf_path: &Path) -> Result<PageSnapshot, DriverError>;
}

const EXPAND_KEYWORDS: &[&str] = &[
    "read more",
    "show more",
    "expand",
    "see more",
    "view more",
    "read full",
    "show full",
    "view full",
    "continue reading",
];

const EXPAND_JS: &str = r#"(keywords) => {
    const clicked = new Set();
    let count = 0;
    const maxClicks = 50;
    for (const keyword of keywords) {
        if (count >= maxClicks) break;
        for (const el of document.querySelectorAll('a, button, [role="button"], span, div')) {
            if (count >= maxClicks) break;
            const text = (el.textContent || '').trim();
            if (!text || text.length >= 100 || !text.toLowerCase().includes(keyword)) continue;
            const id = el.tagName + '|' + (el.className || '') + '|' + text.substring(0, 50);
            if (clicked.has(id)) continue;
            const rect = el.getBoundingClientRect();
            const style = window.getComputedStyle(el);
            if (rect.width > 0 && rect.height > 0 && style.display !== 'none'
                && style.visibility !== 'hidden' && parseFloat(style.opacity) > 0) {
                try {
                    el.scrollIntoView({ behavior: 'auto', block: 'center' });
                    el.click();
                    clicked.add(id);
                    count++;
                } catch (e) {}
            }
        }
    }
    return count;
}"#;

const SET_ROWS_JS: &str = r#"(() => {
    const fp = document.querySelector('forge-paginator');
    if (!fp) return { success: false, message: 'forge-paginator not found' };
    const fs = fp.shadowRoot && fp.shadowRoot.querySelector('forge-select');
    if (!fs) return { success: false, message: 'forge-select not found in shadow root' };
    fp.pageSize = 100;
    fs.value = '100';
    fp.setAttribute('page-size', '100');
    return { success: true, message: 'Set to 100' };
})()"#;

const READ_TOTAL_JS: &str = r#"(() => {
    const fp = document.querySelector('forge-paginator');
    if (!fp || !fp.shadowRoot) return null;
    const label = fp.shadowRoot.querySelector('.range-label');
    if (!label) return null;
    let text = (label.textContent || '').trim();
    const slot = label.querySelector('slot[name="range-label"]');
    if (slot && slot.assignedNodes) {
        const nodes = slot.assignedNodes();
        if (nodes.length > 0) text = nodes.map(n => n.textContent || '').join(' ').trim();
    }
    const m = text.match(/of\s+(\d+)/i);
    return m ? parseInt(m[1]) : null;
})()"#;

#[derive(Debug, Deserialize)]
struct SetRowsResult {
    success: bool,
    message: String,
}

/// chromiumoxide 实现：整个采集过程共用一个浏览器，每个数据页一个新页面
pub struct BrowserCapture {
    handle: BrowserHandle,
    page_timeout: Duration,
}

impl BrowserCapture {
    pub async fn launch(settings: &BrowserSettings, page_timeout_secs: u64) -> Result<Self, DriverError> {
        Ok(Self {
            handle: launch_or_connect(settings).await?,
            page_timeout: Duration::from_secs(page_timeout_secs),
        })
    }

    pub async fn close(self) {
        self.handle.close().await;
    }

    async fn render(&self, driver: &ChromePageDriver, pdf_path: &Path) -> Result<PageSnapshot, DriverError> {
        let mut snapshot = PageSnapshot::default();
        sleep(Duration::from_secs(2)).await;

        let expand = format!(
            "({})({})",
            EXPAND_JS,
            serde_json::to_string(EXPAND_KEYWORDS)?
        );
        match driver.eval(&expand).await {
            Ok(value) => {
                snapshot.expanded = value.as_u64().unwrap_or(0);
                if snapshot.expanded > 0 {
                    info!("  Expanded {} 'Read more' sections", snapshot.expanded);
                    sleep(Duration::from_millis(1500)).await;
                }
            }
            Err(e) => debug!("  Could not expand 'Read more' links: {}", e),
        }

        sleep(Duration::from_secs(2)).await;
        match driver.eval(SET_ROWS_JS).await.map(serde_json::from_value::<SetRowsResult>) {
            Ok(Ok(result)) if result.success => {
                snapshot.rows_per_page_set = true;
                sleep(Duration::from_secs(5)).await;
                snapshot.total_rows = driver.eval(READ_TOTAL_JS).await?.as_u64();
                match snapshot.total_rows {
                    Some(total) if total > 100 => warn!(
                        "  {} total rows exceeds 100, not all rows may be visible",
                        total
                    ),
                    Some(total) => info!("  Set rows per page to 100. Total rows: {}", total),
                    None => debug!("  Set rows per page to 100, total unknown"),
                }
            }
            Ok(Ok(result)) => debug!("  Rows per page unchanged: {}", result.message),
            Ok(Err(e)) => debug!("  Unexpected paginator result: {}", e),
            Err(e) => debug!("  Could not change rows per page: {}", e),
        }

        let params = PrintToPdfParams {
            print_background: Some(true),
            paper_width: Some(8.27),
            paper_height: Some(11.69),
            ..Default::default()
        };
        let pdf = driver.page().pdf(params).await?;
        tokio::fs::write(pdf_path, pdf).await?;
        Ok(snapshot)
    }
}

#[async_trait]
impl PageCapture for BrowserCapture {
    async fn save_pdf(&self, url: &str, pdf_path: &Path) -> Result<PageSnapshot, DriverError> {
        let page = self.handle.open_page(url).await?;
        let driver = ChromePageDriver::new(page);

        let result = match timeout(self.page_timeout, self.render(&driver, pdf_path)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout {
                what: format!("PDF of {}", url),
                secs: self.page_timeout.as_secs_f64(),
            }),
        };

        if let Err(e) = driver.page().clone().close().await {
            debug!("Page close failed: {}", e);
        }
        result
    }
}
