//! 页面驱动 - 基础设施层
//!
//! 对浏览器能力的最小抽象：导航、计数、点击、输入、拖入文件、读取地址。
//! 元素通过 `Target` 定位，`Target` 是按顺序尝试的定位策略列表，
//! 回退链完全由驱动实现处理，上层流程对此无感知。

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{DriverError, DriverResult};

/// 单个定位策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// CSS 选择器
    Css(String),
    /// 在 `scope` 匹配的元素中按文本查找；`exact` 为 false 时按包含匹配（不区分大小写）
    Text {
        scope: String,
        text: String,
        exact: bool,
    },
    /// 兜底策略：在 `selector` 元素上按键（例如 Escape 关闭下拉框）
    Keystroke { selector: String, key: String },
}

/// 元素目标：按顺序尝试的定位策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub strategies: Vec<Locator>,
}

impl Target {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            strategies: vec![Locator::Css(selector.into())],
        }
    }

    pub fn text(scope: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            strategies: vec![Locator::Text {
                scope: scope.into(),
                text: text.into(),
                exact: true,
            }],
        }
    }

    pub fn containing(scope: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            strategies: vec![Locator::Text {
                scope: scope.into(),
                text: text.into(),
                exact: false,
            }],
        }
    }

    /// 追加一个 CSS 回退策略
    pub fn or_css(mut self, selector: impl Into<String>) -> Self {
        self.strategies.push(Locator::Css(selector.into()));
        self
    }

    /// 追加一个文本包含回退策略
    pub fn or_containing(mut self, scope: impl Into<String>, text: impl Into<String>) -> Self {
        self.strategies.push(Locator::Text {
            scope: scope.into(),
            text: text.into(),
            exact: false,
        });
        self
    }

    /// 追加按键兜底策略
    pub fn or_press(mut self, selector: impl Into<String>, key: impl Into<String>) -> Self {
        self.strategies.push(Locator::Keystroke {
            selector: selector.into(),
            key: key.into(),
        });
        self
    }

    /// 日志与错误信息中使用的简短描述（首个策略）
    pub fn label(&self) -> String {
        match self.strategies.first() {
            Some(Locator::Css(sel)) => sel.clone(),
            Some(Locator::Text { scope, text, exact }) => {
                let op = if *exact { "=" } else { "~" };
                format!("{}[text{}'{}']", scope, op, text)
            }
            Some(Locator::Keystroke { selector, key }) => format!("{}<{}>", selector, key),
            None => "<empty target>".to_string(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// 页面驱动能力
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 导航到地址
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// 当前可见的匹配元素数量（只使用第一个能定位到元素的策略）
    async fn count(&self, target: &Target) -> DriverResult<usize>;

    /// 点击元素，依次尝试所有策略
    async fn click(&self, target: &Target) -> DriverResult<()>;

    /// 在输入框中输入文本
    async fn fill(&self, target: &Target, text: &str) -> DriverResult<()>;

    /// 在元素上按键（"Enter"、"Escape" 等）
    async fn press_key(&self, target: &Target, key: &str) -> DriverResult<()>;

    /// 设置富文本编辑器（iframe 内 body）的内容
    async fn set_editor_text(&self, frame: &Target, text: &str) -> DriverResult<()>;

    /// 把本地文件拖入上传区域
    async fn drop_files(&self, zone: &Target, files: &[PathBuf]) -> DriverResult<()>;

    /// 当前页面地址
    async fn current_url(&self) -> DriverResult<String>;

    /// 执行页面脚本并返回 JSON 结果
    async fn eval(&self, script: &str) -> DriverResult<JsonValue>;
}

/// 轮询等待，直到匹配数量满足条件
pub async fn wait_for_count<F>(
    driver: &dyn PageDriver,
    target: &Target,
    what: &str,
    accept: F,
    timeout: Duration,
    poll: Duration,
) -> DriverResult<usize>
where
    F: Fn(usize) -> bool + Send,
{
    let deadline = Instant::now() + timeout;
    loop {
        // 查询失败（页面正在跳转等）视为暂不满足
        let count = match driver.count(target).await {
            Ok(n) => Some(n),
            Err(e) => {
                debug!("count {} failed while waiting: {}", target, e);
                None
            }
        };
        if let Some(n) = count {
            if accept(n) {
                return Ok(n);
            }
        }
        if Instant::now() >= deadline {
            return Err(DriverError::Timeout {
                what: format!("{} ({})", what, target),
                secs: timeout.as_secs_f64(),
            });
        }
        sleep(poll).await;
    }
}

/// 等待元素出现
pub async fn wait_present(
    driver: &dyn PageDriver,
    target: &Target,
    timeout: Duration,
    poll: Duration,
) -> DriverResult<()> {
    wait_for_count(driver, target, "element", |n| n > 0, timeout, poll)
        .await
        .map(|_| ())
}

/// 等待元素消失（不存在或不可见）
pub async fn wait_absent(
    driver: &dyn PageDriver,
    target: &Target,
    timeout: Duration,
    poll: Duration,
) -> DriverResult<()> {
    wait_for_count(driver, target, "element to disappear", |n| n == 0, timeout, poll)
        .await
        .map(|_| ())
}

/// 等待匹配数量恰好等于 `expected`
pub async fn wait_exact_count(
    driver: &dyn PageDriver,
    target: &Target,
    expected: usize,
    timeout: Duration,
    poll: Duration,
) -> DriverResult<()> {
    let what = format!("exactly {} matches", expected);
    wait_for_count(driver, target, &what, |n| n == expected, timeout, poll)
        .await
        .map(|_| ())
}
