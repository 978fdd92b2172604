use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::BrowserSettings;
use crate::error::DriverError;

/// 一个已打开的浏览器及其事件处理任务
pub struct BrowserHandle {
    browser: Browser,
    handler: JoinHandle<()>,
    /// 由本程序启动（而不是连接到操作员已打开的浏览器）
    launched: bool,
}

impl BrowserHandle {
    /// 新建一个页面并导航到 `url`
    pub async fn open_page(&self, url: &str) -> Result<Page, DriverError> {
        let page = self.browser.new_page("about:blank").await.map_err(|e| {
            error!("Failed to create page: {}", e);
            DriverError::from(e)
        })?;
        page.goto(url).await.map_err(|e| {
            error!("Failed to navigate to {}: {}", url, e);
            DriverError::from(e)
        })?;
        debug!("Page opened at {}", url);
        Ok(page)
    }

    /// 关闭浏览器；连接模式下只断开连接，不关闭操作员的浏览器
    pub async fn close(mut self) {
        if self.launched {
            if let Err(e) = self.browser.close().await {
                warn!("Browser did not close cleanly: {}", e);
            }
            if let Err(e) = self.browser.wait().await {
                debug!("Waiting for browser exit failed: {}", e);
            }
        }
        self.handler.abort();
    }
}

/// 按配置启动新浏览器，或连接到调试端口上已运行的浏览器
pub async fn launch_or_connect(settings: &BrowserSettings) -> Result<BrowserHandle, DriverError> {
    let (browser, mut handler, launched) = match settings.debug_port {
        Some(port) => {
            let browser_url = format!("http://localhost:{}", port);
            info!("Connecting to browser at {}", browser_url);
            let (browser, handler) = Browser::connect(&browser_url).await.map_err(|e| {
                error!("Failed to connect to browser: {}", e);
                DriverError::from(e)
            })?;
            (browser, handler, false)
        }
        None => {
            info!("🚀 Launching browser (headless: {})", settings.headless);
            let mut builder = BrowserConfig::builder();
            builder = if settings.headless {
                builder.new_headless_mode()
            } else {
                builder.with_head()
            };
            if let Some(executable) = &settings.executable {
                builder = builder.chrome_executable(executable);
            }
            let config = builder
                .args(vec!["--disable-gpu", "--no-sandbox", "--disable-dev-shm-usage"])
                .window_size(1400, 1000)
                .build()
                .map_err(|e| {
                    error!("Invalid browser configuration: {}", e);
                    DriverError::Browser(e)
                })?;
            let (browser, handler) = Browser::launch(config).await.map_err(|e| {
                error!("Failed to launch browser: {}", e);
                DriverError::from(e)
            })?;
            (browser, handler, true)
        }
    };

    // 在后台处理浏览器事件
    let handler = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;
    debug!("Browser ready");

    Ok(BrowserHandle {
        browser,
        handler,
        launched,
    })
}
