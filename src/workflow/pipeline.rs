//! 步骤流水线 - 流程层
//!
//! ## 职责
//!
//! 按声明顺序执行一组步骤，每个步骤完成一个表单动作。
//!
//! - 前置检查（必需字段缺失）返回 `Some` 时，直接记录结果，不触碰页面
//! - 步骤内部的驱动错误（含超时）：可恢复步骤降级为 `Warning`，关键步骤升级为 `FatalError`
//! - 出现 `FatalError` 后终止本行剩余步骤，但不影响批次
//!
//! 流水线不持有资源，只通过 `FormUi` 借用页面驱动。

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::{Config, Timeouts};
use crate::error::DriverResult;
use crate::infrastructure::{wait_absent, wait_present, PageDriver, Target};
use crate::models::{Record, StepResult};

/// 遮罩层：页面忙碌时覆盖在表单上
pub const BUSY_OVERLAY: &str = "#busy";

/// 步骤分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepClass {
    /// 失败则本行后续步骤没有意义（创建项目）
    Essential,
    /// 失败只记为警告（大多数字段填写）
    Recoverable,
}

/// 步骤执行时共享的上下文
pub struct StepEnv<'a> {
    pub ui: FormUi<'a>,
    pub record: &'a Record,
    pub config: &'a Config,
}

/// 步骤间累积的数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulator {
    /// 步骤内部累积的警告（例如单个关键词失败）
    pub warnings: Vec<String>,
    /// 创建项目后从地址中提取的工作区 ID
    pub workspace_id: Option<String>,
    pub keywords_entered: Vec<String>,
    pub uploaded_files: Vec<PathBuf>,
}

/// 一个表单步骤
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    fn class(&self) -> StepClass {
        StepClass::Recoverable
    }

    /// 前置检查，返回 `Some` 时跳过 `run`
    fn precheck(&self, _record: &Record) -> Option<StepResult> {
        None
    }

    async fn run(&self, env: &StepEnv<'_>, acc: &mut Accumulator) -> DriverResult<StepResult>;
}

/// 单个步骤的执行记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub name: &'static str,
    pub result: StepResult,
}

/// 一次流水线执行的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub steps: Vec<StepRecord>,
}

impl PipelineReport {
    /// 终止本行的致命错误（如有）
    pub fn fatal(&self) -> Option<&str> {
        self.steps.iter().find_map(|s| match &s.result {
            StepResult::FatalError(msg) => Some(msg.as_str()),
            _ => None,
        })
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|s| match &s.result {
            StepResult::Warning(msg) => Some(msg.as_str()),
            _ => None,
        })
    }

    pub fn result_of(&self, name: &str) -> Option<&StepResult> {
        self.steps
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.result)
    }
}

/// 有序步骤列表
pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// 执行所有步骤
    ///
    /// # 参数
    /// - `env`: 页面、记录与配置
    /// - `acc`: 步骤间累积的数据
    ///
    /// # 返回
    /// 返回每个已执行步骤的结果
    pub async fn run(&self, env: &StepEnv<'_>, acc: &mut Accumulator) -> PipelineReport {
        let mut report = PipelineReport::default();
        let row = env.record.row;

        for step in &self.steps {
            let name = step.name();
            let result = match step.precheck(env.record) {
                Some(result) => result,
                None => {
                    debug!("[row {}] ▶ {}", row, name);
                    match step.run(env, acc).await {
                        Ok(result) => result,
                        Err(e) => match step.class() {
                            StepClass::Essential => {
                                StepResult::FatalError(format!("{} failed: {}", name, e))
                            }
                            StepClass::Recoverable => {
                                StepResult::Warning(format!("{} failed: {}", name, e))
                            }
                        },
                    }
                }
            };

            match &result {
                StepResult::Completed => debug!("[row {}] ✓ {}", row, name),
                StepResult::Skipped(reason) => debug!("[row {}] ⏭ {}: {}", row, name, reason),
                StepResult::Warning(msg) => warn!("[row {}] ⚠️ {}", row, msg),
                StepResult::FatalError(msg) => warn!("[row {}] ❌ {}", row, msg),
            }

            let fatal = result.is_fatal();
            report.steps.push(StepRecord { name, result });
            if fatal {
                info!("[row {}] Remaining steps aborted after {}", row, name);
                break;
            }
        }
        report
    }
}

/// 表单交互封装
///
/// 每个交互动作之前都先等待遮罩层消失，再等待目标元素出现。
#[derive(Clone, Copy)]
pub struct FormUi<'a> {
    driver: &'a dyn PageDriver,
    timeouts: Timeouts,
}

impl<'a> FormUi<'a> {
    pub fn new(driver: &'a dyn PageDriver, timeouts: Timeouts) -> Self {
        Self { driver, timeouts }
    }

    pub fn driver(&self) -> &'a dyn PageDriver {
        self.driver
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// 等待遮罩层消失
    pub async fn settle(&self) -> DriverResult<()> {
        wait_absent(
            self.driver,
            &Target::css(BUSY_OVERLAY),
            self.timeouts.overlay,
            self.timeouts.poll,
        )
        .await
    }

    /// 等待遮罩层消失后，等待元素出现
    pub async fn ready(&self, target: &Target) -> DriverResult<()> {
        self.settle().await?;
        wait_present(
            self.driver,
            target,
            self.timeouts.interaction,
            self.timeouts.poll,
        )
        .await
    }

    pub async fn click(&self, target: &Target) -> DriverResult<()> {
        self.ready(target).await?;
        self.driver.click(target).await
    }

    /// 只等待遮罩层后立即点击，由驱动按顺序尝试目标的回退策略
    pub async fn click_any(&self, target: &Target) -> DriverResult<()> {
        self.settle().await?;
        self.driver.click(target).await
    }

    pub async fn fill(&self, target: &Target, text: &str) -> DriverResult<()> {
        self.ready(target).await?;
        self.driver.fill(target, text).await
    }

    /// 填写后按回车提交（行内编辑框）
    pub async fn fill_and_submit(&self, target: &Target, text: &str) -> DriverResult<()> {
        self.fill(target, text).await?;
        self.driver.press_key(target, "Enter").await
    }

    /// 设置富文本编辑器内容
    pub async fn set_editor(&self, frame: &Target, text: &str) -> DriverResult<()> {
        self.ready(frame).await?;
        self.driver.set_editor_text(frame, text).await
    }

    pub async fn current_url(&self) -> DriverResult<String> {
        self.driver.current_url().await
    }
}
