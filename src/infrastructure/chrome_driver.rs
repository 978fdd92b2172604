//! Chrome 页面驱动 - 基础设施层
//!
//! 持有唯一的 Page 资源，对外只暴露 `PageDriver` 能力。
//! 元素定位统一通过注入脚本完成：脚本按策略找到元素后打上 `data-dl-mark` 标记，
//! 再用属性选择器交给 chromiumoxide 取得元素句柄进行点击 / 输入。

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::{DriverError, DriverResult};
use crate::infrastructure::page_driver::{Locator, PageDriver, Target};

/// 基于 chromiumoxide 的页面驱动
pub struct ChromePageDriver {
    page: Page,
    marks: AtomicU64,
}

impl ChromePageDriver {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            marks: AtomicU64::new(0),
        }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    fn next_mark(&self) -> String {
        format!("m{}", self.marks.fetch_add(1, Ordering::Relaxed))
    }

    /// 按单个策略查找元素并打标记，返回属性选择器
    async fn mark(&self, locator: &Locator) -> DriverResult<Option<String>> {
        let (scope, text, exact, css) = match locator {
            Locator::Css(sel) => (String::new(), String::new(), true, sel.clone()),
            Locator::Text { scope, text, exact } => {
                (scope.clone(), text.clone(), *exact, String::new())
            }
            Locator::Keystroke { selector, .. } => {
                (String::new(), String::new(), true, selector.clone())
            }
        };
        let mark = self.next_mark();
        let script = format!(
            r#"
            (() => {{
                const args = {};
                let found = null;
                if (args.css) {{
                    found = document.querySelector(args.css);
                }} else {{
                    const wanted = args.text.trim().toLowerCase();
                    for (const el of document.querySelectorAll(args.scope)) {{
                        const text = (el.textContent || '').trim();
                        const hit = args.exact ? text === args.text.trim() : text.toLowerCase().includes(wanted);
                        if (hit) {{ found = el; break; }}
                    }}
                }}
                if (!found) return false;
                found.setAttribute('data-dl-mark', args.mark);
                return true;
            }})()
            "#,
            json!({ "css": css, "scope": scope, "text": text, "exact": exact, "mark": mark })
        );
        let found = self.eval(&script).await?.as_bool().unwrap_or(false);
        Ok(found.then(|| format!("[data-dl-mark=\"{}\"]", mark)))
    }

    /// 依次尝试所有策略，返回第一个命中的元素及命中的策略
    async fn resolve(&self, target: &Target) -> DriverResult<(Element, Locator)> {
        for locator in &target.strategies {
            if let Some(selector) = self.mark(locator).await? {
                match self.page.find_element(selector).await {
                    Ok(el) => return Ok((el, locator.clone())),
                    Err(e) => debug!("marked element vanished for {}: {}", target, e),
                }
            }
        }
        Err(DriverError::NotFound {
            target: target.label(),
        })
    }
}

#[async_trait]
impl PageDriver for ChromePageDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        debug!("navigate: {}", url);
        self.page.goto(url).await?;
        Ok(())
    }

    async fn count(&self, target: &Target) -> DriverResult<usize> {
        for locator in &target.strategies {
            let args = match locator {
                Locator::Css(sel) => json!({ "css": sel }),
                Locator::Text { scope, text, exact } => {
                    json!({ "scope": scope, "text": text, "exact": exact })
                }
                Locator::Keystroke { .. } => continue,
            };
            let script = format!(
                r#"
                (() => {{
                    const args = {};
                    const visible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
                    let els = [];
                    if (args.css) {{
                        els = Array.from(document.querySelectorAll(args.css));
                    }} else {{
                        const wanted = args.text.trim().toLowerCase();
                        els = Array.from(document.querySelectorAll(args.scope)).filter((el) => {{
                            const text = (el.textContent || '').trim();
                            return args.exact ? text === args.text.trim() : text.toLowerCase().includes(wanted);
                        }});
                    }}
                    return els.filter(visible).length;
                }})()
                "#,
                args
            );
            let n = self.eval(&script).await?.as_u64().unwrap_or(0) as usize;
            if n > 0 {
                return Ok(n);
            }
        }
        Ok(0)
    }

    async fn click(&self, target: &Target) -> DriverResult<()> {
        let (el, locator) = self.resolve(target).await?;
        if let Locator::Keystroke { key, .. } = locator {
            el.press_key(key).await?;
            return Ok(());
        }
        el.scroll_into_view().await?;
        el.click().await?;
        Ok(())
    }

    async fn fill(&self, target: &Target, text: &str) -> DriverResult<()> {
        let (el, _) = self.resolve(target).await?;
        el.click().await?;
        el.type_str(text).await?;
        Ok(())
    }

    async fn press_key(&self, target: &Target, key: &str) -> DriverResult<()> {
        let (el, _) = self.resolve(target).await?;
        el.press_key(key).await?;
        Ok(())
    }

    async fn set_editor_text(&self, frame: &Target, text: &str) -> DriverResult<()> {
        let locator = frame.strategies.first().ok_or_else(|| DriverError::NotFound {
            target: frame.label(),
        })?;
        let selector = self
            .mark(locator)
            .await?
            .ok_or_else(|| DriverError::NotFound {
                target: frame.label(),
            })?;
        let script = format!(
            r#"
            (() => {{
                const frame = document.querySelector({sel});
                const body = frame && frame.contentDocument && frame.contentDocument.body;
                if (!body) return false;
                body.focus();
                body.textContent = {text};
                body.dispatchEvent(new Event('input', {{ bubbles: true }}));
                return true;
            }})()
            "#,
            sel = serde_json::to_string(&selector)?,
            text = serde_json::to_string(text)?,
        );
        match self.eval(&script).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(DriverError::Script(format!(
                "editor body not reachable in {}",
                frame
            ))),
        }
    }

    async fn drop_files(&self, zone: &Target, files: &[PathBuf]) -> DriverResult<()> {
        let locator = zone.strategies.first().ok_or_else(|| DriverError::NotFound {
            target: zone.label(),
        })?;
        let zone_selector = self
            .mark(locator)
            .await?
            .ok_or_else(|| DriverError::NotFound {
                target: zone.label(),
            })?;

        for file in files {
            let input_id = format!("dl-drop-{}", self.next_mark());
            // 创建一个临时文件输入框，change 时向上传区域派发 dragenter/dragover/drop
            let script = format!(
                r#"
                (() => {{
                    const target = document.querySelector({zone});
                    if (!target) return false;
                    const input = document.createElement('input');
                    input.type = 'file';
                    input.id = {id};
                    input.style.display = 'none';
                    input.onchange = function () {{
                        const rect = target.getBoundingClientRect();
                        const x = rect.left + (rect.width >> 1);
                        const y = rect.top + (rect.height >> 1);
                        const dataTransfer = {{ files: this.files }};
                        ['dragenter', 'dragover', 'drop'].forEach(function (name) {{
                            const evt = document.createEvent('MouseEvent');
                            evt.initMouseEvent(name, true, true, window, 0, 0, 0, x, y, false, false, false, false, 0, null);
                            evt.dataTransfer = dataTransfer;
                            target.dispatchEvent(evt);
                        }});
                        setTimeout(function () {{ input.remove(); }}, 25);
                    }};
                    document.body.appendChild(input);
                    return true;
                }})()
                "#,
                zone = serde_json::to_string(&zone_selector)?,
                id = serde_json::to_string(&input_id)?,
            );
            if self.eval(&script).await?.as_bool() != Some(true) {
                return Err(DriverError::NotFound {
                    target: zone.label(),
                });
            }

            let input = self.page.find_element(format!("#{}", input_id)).await?;
            let mut params =
                SetFileInputFilesParams::new(vec![file.to_string_lossy().to_string()]);
            params.backend_node_id = Some(input.backend_node_id);
            self.page.execute(params).await?;
            debug!("dropped file {}", file.display());
        }
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn eval(&self, script: &str) -> DriverResult<JsonValue> {
        let result = self.page.evaluate(script).await?;
        let value = result.into_value::<JsonValue>().unwrap_or(JsonValue::Null);
        Ok(value)
    }
}
