//! 浏览器会话
//!
//! 一个批次对应一个会话。控制器通过 `SessionFactory` 打开会话，
//! 批次结束或出现会话级错误时关闭，测试中用脚本化的假驱动替代。

use async_trait::async_trait;
use std::sync::Arc;

use crate::browser::{launch_or_connect, BrowserHandle};
use crate::config::Config;
use crate::error::DriverError;
use crate::infrastructure::{ChromePageDriver, PageDriver};

/// 一个已打开的会话
#[async_trait]
pub trait BrowserSession: Send {
    fn driver(&self) -> Arc<dyn PageDriver>;

    /// 释放会话资源
    async fn close(self: Box<Self>);
}

/// 会话工厂
#[async_trait]
pub trait SessionFactory: Send {
    async fn open(&mut self) -> Result<Box<dyn BrowserSession>, DriverError>;
}

/// chromiumoxide 会话
pub struct ChromeSession {
    handle: BrowserHandle,
    driver: Arc<ChromePageDriver>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    fn driver(&self) -> Arc<dyn PageDriver> {
        self.driver.clone()
    }

    async fn close(self: Box<Self>) {
        let ChromeSession { handle, driver } = *self;
        if let Err(e) = driver.page().clone().close().await {
            tracing::debug!("Page close failed: {}", e);
        }
        handle.close().await;
    }
}

/// 每次打开会话都启动（或连接）一个浏览器并新建页面
pub struct ChromeSessionFactory {
    config: Config,
}

impl ChromeSessionFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&mut self) -> Result<Box<dyn BrowserSession>, DriverError> {
        let handle = launch_or_connect(&self.config.browser).await?;
        let page = handle.open_page(&self.config.site.home_url).await?;
        Ok(Box::new(ChromeSession {
            handle,
            driver: Arc::new(ChromePageDriver::new(page)),
        }))
    }
}
