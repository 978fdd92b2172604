//! 集成测试共用的假实现：脚本化页面驱动、会话工厂、操作员和 CSV 夹具

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use datalumos_batch::config::{Config, TimeoutSettings};
use datalumos_batch::error::{DriverError, DriverResult};
use datalumos_batch::infrastructure::{PageDriver, Target};
use datalumos_batch::models::fields;
use datalumos_batch::orchestrator::{BrowserSession, SessionFactory};
use datalumos_batch::services::Operator;
use datalumos_batch::workflow::steps::{selectors, UPLOAD_DONE_TEXT};

pub const FIRST_WORKSPACE_ID: u64 = 239100;

/// 脚本化驱动的可变状态
#[derive(Debug, Default)]
pub struct FakeState {
    pub url: String,
    pub next_id: u64,
    /// 目标描述中包含这些片段时视为页面上不存在
    pub missing: Vec<String>,
    /// 目标描述中包含这些片段时，点击失败一次
    pub fail_once: Vec<String>,
    /// 剩余几次内联错误横幅查询返回"存在"
    pub inline_errors: usize,
    pub dropped: usize,
    pub actions: Vec<String>,
}

/// 按目标描述应答的假页面驱动
///
/// 默认所有元素都存在、遮罩层不存在，"继续到工作区"会把地址切到新项目。
#[derive(Debug, Default)]
pub struct FakeDriver {
    pub state: Mutex<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: FIRST_WORKSPACE_ID,
                ..Default::default()
            }),
        }
    }

    pub fn missing(self, fragment: &str) -> Self {
        self.state.lock().unwrap().missing.push(fragment.to_string());
        self
    }

    pub fn fail_once(self, fragment: &str) -> Self {
        self.state.lock().unwrap().fail_once.push(fragment.to_string());
        self
    }

    pub fn inline_errors(self, n: usize) -> Self {
        self.state.lock().unwrap().inline_errors = n;
        self
    }

    pub fn set_url(&self, url: &str) {
        self.state.lock().unwrap().url = url.to_string();
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn count_actions(&self, fragment: &str) -> usize {
        self.actions().iter().filter(|a| a.contains(fragment)).count()
    }

    pub fn dropped(&self) -> usize {
        self.state.lock().unwrap().dropped
    }

    fn is_missing(state: &FakeState, label: &str) -> bool {
        state.missing.iter().any(|m| label.contains(m.as_str()))
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("navigate {}", url));
        state.url = url.to_string();
        Ok(())
    }

    async fn count(&self, target: &Target) -> DriverResult<usize> {
        let label = target.label();
        let mut state = self.state.lock().unwrap();
        if label == "#busy" {
            return Ok(0);
        }
        if label.contains(".alert-danger") {
            if state.inline_errors > 0 {
                state.inline_errors -= 1;
                return Ok(1);
            }
            return Ok(0);
        }
        if label.contains("Verifying you are human") {
            return Ok(0);
        }
        if label.contains(UPLOAD_DONE_TEXT) {
            return Ok(state.dropped);
        }
        if Self::is_missing(&state, &label) {
            return Ok(0);
        }
        Ok(1)
    }

    async fn click(&self, target: &Target) -> DriverResult<()> {
        let label = target.label();
        let mut state = self.state.lock().unwrap();
        if Self::is_missing(&state, &label) {
            return Err(DriverError::NotFound { target: label });
        }
        if let Some(pos) = state.fail_once.iter().position(|f| label.contains(f.as_str())) {
            state.fail_once.remove(pos);
            state.actions.push(format!("click-failed {}", label));
            return Err(DriverError::NotFound { target: label });
        }
        state.actions.push(format!("click {}", label));
        if label == selectors::UPLOAD_BUTTON {
            state.dropped = 0;
        }
        if label.contains(selectors::CONTINUE_TO_WORKSPACE) {
            let id = state.next_id;
            state.next_id += 1;
            state.url = format!(
                "https://www.datalumos.org/datalumos/workspace?goToPath=/datalumos/{}&goToLevel=project",
                id
            );
        }
        Ok(())
    }

    async fn fill(&self, target: &Target, text: &str) -> DriverResult<()> {
        let label = target.label();
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("fill {} = {}", label, text));
        Ok(())
    }

    async fn press_key(&self, target: &Target, key: &str) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("press {} {}", target.label(), key));
        Ok(())
    }

    async fn set_editor_text(&self, frame: &Target, text: &str) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("editor {} = {}", frame.label(), text));
        Ok(())
    }

    async fn drop_files(&self, zone: &Target, files: &[PathBuf]) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("drop {} x{}", zone.label(), files.len()));
        state.dropped += files.len();
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn eval(&self, _script: &str) -> DriverResult<JsonValue> {
        Ok(JsonValue::Null)
    }
}

/// 记录提示内容、立即返回的操作员
#[derive(Debug, Default)]
pub struct RecordingOperator {
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingOperator {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Operator for RecordingOperator {
    async fn confirm(&self, prompt: &str) {
        self.prompts.lock().unwrap().push(prompt.to_string());
    }
}

/// 每次打开都交出同一个驱动的会话工厂
pub struct FakeFactory {
    pub driver: Arc<FakeDriver>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    /// 第 n 次（从 1 开始）打开会话时失败
    pub fail_on_open: Option<usize>,
}

impl FakeFactory {
    pub fn new(driver: Arc<FakeDriver>) -> Self {
        Self {
            driver,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            fail_on_open: None,
        }
    }
}

struct FakeSession {
    driver: Arc<FakeDriver>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    fn driver(&self) -> Arc<dyn PageDriver> {
        self.driver.clone()
    }

    async fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&mut self) -> Result<Box<dyn BrowserSession>, DriverError> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_open == Some(n) {
            return Err(DriverError::Browser("browser exited".into()));
        }
        Ok(Box::new(FakeSession {
            driver: self.driver.clone(),
            closed: self.closed.clone(),
        }))
    }
}

/// 毫秒级超时、不暂停、不提名的测试配置，所有文件都放在 `dir` 下
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.input_csv = dir.join("inventory.csv");
    config.output_csv = dir.join("results.csv");
    config.upload_root = dir.join("uploads");
    config.manual_entry_file = dir.join("manual_entry.txt").to_string_lossy().to_string();
    config.output_log_file = dir.join("output.txt").to_string_lossy().to_string();
    config.pause_at_end = false;
    config.nomination.enabled = false;
    config.timeouts = TimeoutSettings {
        interaction_ms: 30,
        overlay_ms: 30,
        upload_ms: 200,
        poll_ms: 1,
        publish_retry_delay_ms: 1,
        verification_ms: 10,
    };
    config
}

/// 输入表的一行
#[derive(Debug, Clone, Default)]
pub struct InputRow {
    pub title: &'static str,
    pub summary: &'static str,
    pub url: &'static str,
    pub keywords: &'static str,
    pub path: &'static str,
    pub workspace_id: &'static str,
}

pub const INPUT_HEADERS: [&str; 6] = [
    fields::TITLE,
    fields::SUMMARY,
    fields::SOURCE_URL,
    fields::KEYWORDS,
    fields::UPLOAD_PATH,
    fields::WORKSPACE_ID,
];

pub fn write_input(path: &Path, rows: &[InputRow]) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(INPUT_HEADERS).unwrap();
    for r in rows {
        writer
            .write_record([r.title, r.summary, r.url, r.keywords, r.path, r.workspace_id])
            .unwrap();
    }
    writer.flush().unwrap();
}

/// 在上传根目录下建立含 `n` 个文件的子目录
pub fn upload_folder(root: &Path, name: &str, n: usize) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for i in 0..n {
        std::fs::write(dir.join(format!("part{}.csv", i)), b"a,b\n1,2\n").unwrap();
    }
}

/// 读出整张 CSV（表头 + 行）
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<HashMap<String, String>>) {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            headers
                .iter()
                .cloned()
                .zip(r.iter().map(String::from))
                .collect()
        })
        .collect();
    (headers, rows)
}

pub fn complete_row(url: &'static str, path: &'static str) -> InputRow {
    InputRow {
        title: "Flu Surveillance",
        summary: "Weekly influenza data",
        url,
        keywords: "influenza, surveillance",
        path,
        workspace_id: "",
    }
}
