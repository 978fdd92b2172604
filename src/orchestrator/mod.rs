//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次调度和资源生命周期，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 上传应用
//! - 运行前检查（配置、输出文件、远端登记表）
//! - 装配行处理器和会话工厂
//! - 输出全局统计信息
//!
//! ### `batch_controller` - 批次重启控制器
//! - 分批、每批一个浏览器会话
//! - 会话级错误后用新会话重做剩余条目
//! - 终止性错误等待操作员确认
//!
//! ### `session` - 浏览器会话
//! - 唯一持有 Browser 的地方
//!
//! ## 层次关系
//!
//! ```text
//! app
//!     ↓
//! batch_controller (处理 Vec<Batch>)
//!     ↓
//! workflow::RowProcessor (处理单行)
//!     ↓
//! services (能力层：表格 / 登记表 / 提名 / 操作员)
//!     ↓
//! infrastructure (基础设施：PageDriver)
//! ```

pub mod app;
pub mod batch_controller;
pub mod session;

// 重新导出主要类型
pub use app::App;
pub use batch_controller::{BatchController, ControllerSettings, RunReport};
pub use session::{BrowserSession, ChromeSessionFactory, SessionFactory};
