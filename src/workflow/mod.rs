//! 流程层（Workflow Layer）
//!
//! ## 职责
//!
//! 定义"一行数据"在 DataLumos 上的完整处理流程：
//!
//! - `sign_in` - 每个会话一次的登录
//! - `steps` + `pipeline` - 项目创建与表单填写步骤
//! - `publish` - 发布（含一次重试与会话级错误识别）
//! - `dataset` - 上传文件的行列数与大小统计
//! - `row_processor` - 把以上串起来，并负责写回、登记表、提名与输出

pub mod dataset;
pub mod keywords;
pub mod pipeline;
pub mod publish;
pub mod row_ctx;
pub mod row_processor;
pub mod sign_in;
pub mod steps;

pub use dataset::DatasetStats;
pub use pipeline::{Accumulator, FormUi, Pipeline, PipelineReport, Step, StepClass, StepEnv};
pub use publish::{PublishFailure, PublishFlow};
pub use row_ctx::RowCtx;
pub use row_processor::{RowAbort, RowDeps, RowProcessor, RowRunner};
pub use sign_in::sign_in;
pub use steps::datalumos_pipeline;
