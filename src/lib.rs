//! # DataLumos Batch
//!
//! 把数据清单中的条目批量上传到 DataLumos 存档的浏览器自动化工具，
//! 附带 CDC 数据页采集和上传目录检查两个辅助命令。
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - `PageDriver` 抽象与 chromiumoxide 实现
//! - `browser/` - 启动或连接浏览器
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `tabular` - 输入表读取 / 写回、输出表 upsert
//! - `registry` - 远端登记表更新
//! - `nomination` - 存档提名
//! - `operator` - 等待操作员确认
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一行数据"的完整处理流程
//! - `Pipeline` + `steps` - 表单填写步骤
//! - `PublishFlow` - 发布
//! - `RowProcessor` - 创建 → 写回 → 发布 → 登记 → 提名 → 输出
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_controller` - 分批、每批一个会话、会话级错误后重启
//! - `orchestrator/app` - 运行前检查与组件装配
//!
//! ## 模块结构

pub mod audit;
pub mod browser;
pub mod collector;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, Mode};
pub use error::{AppError, AppResult, BatchFatal};
pub use infrastructure::{PageDriver, Target};
pub use models::{Record, RowOutcome, RowSelection, WorkItem};
pub use orchestrator::{App, BatchController, RunReport};
pub use workflow::{RowCtx, RowProcessor, RowRunner};
