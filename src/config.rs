//! 程序配置
//!
//! 每次运行只构建一次，之后以只读引用传给所有组件。
//! 构建顺序：默认值 → 可选的 TOML 配置文件 → 环境变量 → 命令行参数（在 main 中覆盖）。

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// 运行模式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// 创建项目并发布
    #[default]
    Default,
    /// 只创建，不发布
    NoPublish,
    /// 只发布已创建的项目（依据已有的工作区 ID）
    OnlyPublish,
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 每个浏览器会话处理的行数
    pub batch_size: usize,
    /// 同一行触发会话级错误的最大次数，超过后降级为行错误（0 表示不限制）
    pub max_batch_fatal_restarts: u32,
    /// 运行结束时是否等待操作员确认后再关闭浏览器
    pub pause_at_end: bool,
    pub mode: Mode,
    /// 输入 CSV（DataLumos 清单导出）
    pub input_csv: PathBuf,
    /// 输出 CSV（按来源 URL 更新）
    pub output_csv: PathBuf,
    /// 上传文件的根目录，行内 `path` 列是相对于它的子目录
    pub upload_root: PathBuf,
    /// 每行预期的上传文件数量（0 表示不检查）
    pub expected_upload_files: usize,
    /// 关键词最短长度，短于该长度的词视为噪声
    pub min_keyword_len: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 运行日志文件
    pub output_log_file: String,
    /// 写回失败时记录待手动录入值的文件
    pub manual_entry_file: String,
    pub browser: BrowserSettings,
    pub site: SiteSettings,
    pub credentials: Credentials,
    pub operator: OperatorIdentity,
    pub nomination: NominationSettings,
    pub registry: Option<RegistrySettings>,
    pub timeouts: TimeoutSettings,
    pub write_back: WriteBackSettings,
    pub collect: CollectSettings,
    pub audit: AuditSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// 设置后连接到已打开的浏览器调试端口，否则启动新浏览器
    pub debug_port: Option<u16>,
    pub headless: bool,
    pub executable: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub home_url: String,
    pub workspace_url: String,
    /// 项目公开页地址模板，`{id}` 替换为工作区 ID
    pub project_url: String,
}

impl SiteSettings {
    pub fn project_url(&self, workspace_id: &str) -> String {
        self.project_url.replace("{id}", workspace_id)
    }

    /// 工作区中某个项目的编辑页
    pub fn workspace_project_url(&self, workspace_id: &str) -> String {
        format!(
            "{}?goToPath=/datalumos/{}&goToLevel=project",
            self.workspace_url, workspace_id
        )
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// 操作员身份（用于存档提名表单）
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct OperatorIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub institution: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NominationSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub project: String,
}

/// 远端登记表（Google Sheets）
#[derive(Clone, Debug, Deserialize)]
pub struct RegistrySettings {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_sheets_api")]
    pub api_base: String,
}

/// 超时设置（毫秒）
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// 普通表单交互
    pub interaction_ms: u64,
    /// 等待遮罩层消失
    pub overlay_ms: u64,
    /// 等待批量上传完成
    pub upload_ms: u64,
    /// 轮询间隔
    pub poll_ms: u64,
    /// 发布流程重试前的等待
    pub publish_retry_delay_ms: u64,
    /// 人机验证等待
    pub verification_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WriteBackSettings {
    pub attempts: u32,
}

/// `collect` 命令：从机构清单采集 CDC 数据页
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CollectSettings {
    /// 机构数据清单（CSV）
    pub inventory_csv: PathBuf,
    /// 采集结果表
    pub output_csv: PathBuf,
    /// 每个标题一个子目录的根目录
    pub data_root: PathBuf,
    /// URL 可访问性检查的超时（秒）
    pub access_timeout_secs: u64,
    /// 打开页面并生成 PDF 的超时（秒）
    pub page_timeout_secs: u64,
}

/// `audit` 命令：检查上传目录的文件数量
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub log_file: PathBuf,
}

/// 转换后的超时时长
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
    pub interaction: Duration,
    pub overlay: Duration,
    pub upload: Duration,
    pub poll: Duration,
    pub publish_retry_delay: Duration,
    pub verification: Duration,
}

impl TimeoutSettings {
    pub fn durations(&self) -> Timeouts {
        Timeouts {
            interaction: Duration::from_millis(self.interaction_ms),
            overlay: Duration::from_millis(self.overlay_ms),
            upload: Duration::from_millis(self.upload_ms),
            poll: Duration::from_millis(self.poll_ms.max(1)),
            publish_retry_delay: Duration::from_millis(self.publish_retry_delay_ms),
            verification: Duration::from_millis(self.verification_ms),
        }
    }
}

fn default_sheets_api() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_batch_fatal_restarts: 3,
            pause_at_end: true,
            mode: Mode::Default,
            input_csv: PathBuf::from("inventory.csv"),
            output_csv: PathBuf::from("datalumos_results.csv"),
            upload_root: PathBuf::new(),
            expected_upload_files: 2,
            min_keyword_len: 3,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            manual_entry_file: "manual_entry.txt".to_string(),
            browser: BrowserSettings::default(),
            site: SiteSettings::default(),
            credentials: Credentials::default(),
            operator: OperatorIdentity::default(),
            nomination: NominationSettings::default(),
            registry: None,
            timeouts: TimeoutSettings::default(),
            write_back: WriteBackSettings::default(),
            collect: CollectSettings::default(),
            audit: AuditSettings::default(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            debug_port: None,
            headless: false,
            executable: None,
        }
    }
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            home_url: "https://www.icpsr.umich.edu/sites/datalumos/home".to_string(),
            workspace_url: "https://www.datalumos.org/datalumos/workspace".to_string(),
            project_url: "https://www.datalumos.org/datalumos/project/{id}/version/V1/view"
                .to_string(),
        }
    }
}

impl Default for NominationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://digital2.library.unt.edu/nomination/eth2024/add/".to_string(),
            project: "eth2024".to_string(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            interaction_ms: 50_000,
            overlay_ms: 360_000,
            upload_ms: 2_000_000,
            poll_ms: 250,
            publish_retry_delay_ms: 5_000,
            verification_ms: 30_000,
        }
    }
}

impl Default for WriteBackSettings {
    fn default() -> Self {
        Self { attempts: 3 }
    }
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            inventory_csv: PathBuf::from("Data_Inventories - cdc.csv"),
            output_csv: PathBuf::from("CDCCollectedData.csv"),
            data_root: PathBuf::from("CDC data"),
            access_timeout_secs: 30,
            page_timeout_secs: 120,
        }
    }
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("missing_file_search_results.log"),
        }
    }
}

impl Config {
    /// 加载配置：默认值 → 配置文件（如果存在）→ 环境变量
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env()
    }

    /// 从 TOML 文件读取，未出现的键使用默认值
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::FileParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 用环境变量覆盖
    pub fn with_env(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_string("DATALUMOS_USERNAME") {
            self.credentials.username = Some(v);
        }
        if let Some(v) = env_string("DATALUMOS_PASSWORD") {
            self.credentials.password = Some(v);
        }
        if let Some(v) = env_string("OPERATOR_NAME") {
            self.operator.name = Some(v);
        }
        if let Some(v) = env_string("OPERATOR_EMAIL") {
            self.operator.email = Some(v);
        }
        if let Some(v) = env_string("OPERATOR_INSTITUTION") {
            self.operator.institution = Some(v);
        }
        if let Some(v) = env_string("REGISTRY_TOKEN") {
            if let Some(registry) = self.registry.as_mut() {
                registry.access_token = v;
            }
        }
        if let Some(v) = env_string("BROWSER_DEBUG_PORT") {
            self.browser.debug_port = Some(env_parse("BROWSER_DEBUG_PORT", &v, "port number")?);
        }
        if let Some(v) = env_string("BATCH_SIZE") {
            self.batch_size = env_parse("BATCH_SIZE", &v, "positive integer")?;
        }
        if let Some(v) = env_string("VERBOSE_LOGGING") {
            self.verbose_logging = env_parse("VERBOSE_LOGGING", &v, "bool")?;
        }
        Ok(self)
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts.durations()
    }

    /// 运行前的配置检查
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.write_back.attempts == 0 {
            return Err(ConfigError::Invalid(
                "write_back.attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(
    name: &str,
    value: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::EnvVarParseFailed {
        var_name: name.to_string(),
        value: value.to_string(),
        expected_type: expected.to_string(),
    })
}
