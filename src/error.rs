//! 错误类型定义
//!
//! 按照处理层次划分：
//! - `ConfigError`：运行开始前即可发现的配置问题，直接终止整个运行
//! - `StoreError`：表格文件（输入 / 输出）读写错误
//! - `DriverError`：页面驱动（浏览器）错误，由步骤流水线降级为警告或行错误
//! - `RegistryError`：远端登记表更新错误，只记录为行错误
//! - `BatchFatal`：会话级致命信号，唯一允许穿过行处理器到达批次控制器的错误

use std::path::PathBuf;
use thiserror::Error;

use crate::models::WorkItem;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 行选择表达式无效
    #[error("invalid row selection '{input}': {reason}")]
    InvalidRows { input: String, reason: String },

    /// 配置文件读取失败
    #[error("cannot read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// 配置文件解析失败
    #[error("cannot parse config file {path}: {source}")]
    FileParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// 环境变量解析失败
    #[error("environment variable {var_name}='{value}' is not a valid {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },

    /// 输出文件不可写
    #[error("output target {path} is not writable: {reason}")]
    OutputNotWritable { path: PathBuf, reason: String },

    /// 远端登记表缺少必需列
    #[error("registry sheet is missing required columns: {}", .missing.join(", "))]
    MissingRegistryColumns { missing: Vec<String> },

    /// 远端登记表无法访问
    #[error("registry is not reachable: {0}")]
    RegistryUnavailable(String),

    /// 其他配置问题
    #[error("{0}")]
    Invalid(String),
}

/// 表格文件错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 行号超出范围（行号从 1 开始，不含表头）
    #[error("row {row} not found in {path} ({available} data rows)")]
    RowNotFound {
        path: PathBuf,
        row: usize,
        available: usize,
    },

    /// 文件读写失败（包括被其他进程占用）
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// CSV 解析 / 写入失败
    #[error("csv error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    /// 缺少键列
    #[error("column '{column}' not found in {path}")]
    MissingColumn { path: PathBuf, column: String },
}

impl StoreError {
    /// 是否为可重试的写入冲突（文件被锁定、权限被占用等）
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::Other
            ),
            StoreError::Csv { source, .. } => source.is_io_error(),
            _ => false,
        }
    }
}

/// 页面驱动错误
#[derive(Debug, Error)]
pub enum DriverError {
    /// 所有定位策略都没有找到元素
    #[error("element not found: {target}")]
    NotFound { target: String },

    /// 等待条件超时
    #[error("timed out after {secs:.1}s waiting for {what}")]
    Timeout { what: String, secs: f64 },

    /// 浏览器 / CDP 错误
    #[error("browser error: {0}")]
    Browser(String),

    /// 页面脚本执行失败
    #[error("script error: {0}")]
    Script(String),

    /// 本地文件错误（上传目录等）
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<chromiumoxide::error::CdpError> for DriverError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        DriverError::Browser(err.to_string())
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::Script(err.to_string())
    }
}

/// 远端登记表错误
#[derive(Debug, Error)]
pub enum RegistryError {
    /// 网络请求失败
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// 接口返回错误响应
    #[error("registry returned {status}: {body}")]
    BadResponse { status: u16, body: String },

    /// 找不到对应键的行
    #[error("no registry row for key '{0}'")]
    KeyNotFound(String),
}

/// 存档提名提交错误
#[derive(Debug, Error)]
pub enum NominationError {
    /// 网络请求失败
    #[error("nomination request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// 提名服务拒绝
    #[error("nomination rejected with {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// 会话级致命信号
///
/// 页面出现内联错误横幅时，说明整个浏览器会话的页面状态已不可信，
/// 而不是当前这一行的数据有问题。控制器收到后关闭会话并重新切分剩余条目。
#[derive(Debug, Clone, Error)]
#[error("batch-fatal: {message}")]
pub struct BatchFatal {
    pub message: String,
    /// 显式指定的剩余条目；为 `None` 时由控制器从失败位置计算
    pub remaining: Option<Vec<WorkItem>>,
}

impl BatchFatal {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            remaining: None,
        }
    }

    pub fn with_remaining(message: impl Into<String>, remaining: Vec<WorkItem>) -> Self {
        Self {
            message: message.into(),
            remaining: Some(remaining),
        }
    }
}

/// 应用程序顶层错误
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("browser error: {0}")]
    Driver(#[from] DriverError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 页面驱动结果类型
pub type DriverResult<T> = Result<T, DriverError>;
