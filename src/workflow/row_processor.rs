//! 行处理器 - 流程层
//!
//! ## 职责
//!
//! 处理输入表中的一行：
//!
//! 1. 重新读取该行（不跨批次缓存）
//! 2. 按运行模式创建项目（执行步骤流水线）或直接使用已有的工作区 ID
//! 3. 拿到工作区 ID 后立即写回输入表
//! 4. 发布（除非关闭发布），内联错误作为会话级错误向上抛出
//! 5. 发布成功后更新远端登记表
//! 6. 提交存档提名
//! 7. 按来源 URL 更新输出表，并输出一行摘要
//!
//! 除会话级错误和输出表写入失败外，所有问题都记录在 `RowOutcome` 中，不向上抛出。

use async_trait::async_trait;
use chrono::Local;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, Mode};
use crate::error::{AppError, BatchFatal, DriverError, StoreError};
use crate::infrastructure::PageDriver;
use crate::models::{fields, Record, RowOutcome};
use crate::services::{
    write_back_with_retry, ManualEntryLog, Nominator, Operator, OutputStore, RegistryUpdater,
    RowSource,
};
use crate::utils::truncate_text;
use crate::workflow::dataset::DatasetStats;
use crate::workflow::pipeline::{Accumulator, FormUi, Pipeline, StepEnv};
use crate::workflow::publish::{PublishFailure, PublishFlow};
use crate::workflow::row_ctx::RowCtx;
use crate::workflow::sign_in::sign_in;
use crate::workflow::steps::datalumos_pipeline;

/// 中止当前行并交给批次控制器处理的情况
#[derive(Debug)]
pub enum RowAbort {
    /// 会话状态已损坏，需要换新会话重新处理剩余条目
    BatchFatal(BatchFatal),
    /// 无法继续运行（输出表不可写等），等待操作员确认后结束
    Terminal(AppError),
}

impl From<BatchFatal> for RowAbort {
    fn from(fatal: BatchFatal) -> Self {
        RowAbort::BatchFatal(fatal)
    }
}

impl From<StoreError> for RowAbort {
    fn from(err: StoreError) -> Self {
        RowAbort::Terminal(AppError::Store(err))
    }
}

/// 批次控制器调用的行处理能力
#[async_trait]
pub trait RowRunner: Send {
    /// 新会话打开后执行一次（登录）
    async fn begin_session(&mut self, driver: &dyn PageDriver) -> Result<(), DriverError>;

    /// 处理一行
    async fn run_row(
        &mut self,
        driver: &dyn PageDriver,
        ctx: RowCtx,
    ) -> Result<RowOutcome, RowAbort>;

    /// 放弃一行（反复触发会话级错误），记为行错误并写入输出表
    async fn abandon_row(&mut self, ctx: RowCtx, reason: &str) -> Result<RowOutcome, AppError>;
}

/// 行处理器依赖的外部能力
pub struct RowDeps {
    pub source: Arc<dyn RowSource>,
    pub output: Arc<dyn OutputStore>,
    pub operator: Arc<dyn Operator>,
    pub registry: Option<RegistryUpdater>,
    pub nominator: Option<Box<dyn Nominator>>,
}

/// DataLumos 行处理器
pub struct RowProcessor {
    config: Config,
    deps: RowDeps,
    pipeline: Pipeline,
    publish: PublishFlow,
    manual: ManualEntryLog,
    /// 本次运行中已创建项目的行，会话重启后据此续做而不重复创建
    created: HashMap<usize, CreatedProject>,
}

/// 第一次创建项目时的结果，续做和放弃时原样带回
#[derive(Debug, Clone, Default)]
struct CreatedProject {
    id: String,
    warnings: Vec<String>,
    keywords_entered: Vec<String>,
    uploaded_files: Vec<PathBuf>,
}

impl CreatedProject {
    fn replay(&self, acc: &mut Accumulator, outcome: &mut RowOutcome) {
        outcome.correlation_id = Some(self.id.clone());
        for warning in &self.warnings {
            outcome.warn(warning.clone());
        }
        acc.workspace_id = Some(self.id.clone());
        acc.keywords_entered = self.keywords_entered.clone();
        acc.uploaded_files = self.uploaded_files.clone();
    }
}

impl RowProcessor {
    pub fn new(config: &Config, deps: RowDeps) -> Self {
        Self {
            pipeline: datalumos_pipeline(config),
            publish: PublishFlow::new(config.site.clone(), config.timeouts()),
            manual: ManualEntryLog::with_path(config.manual_entry_file.clone()),
            config: config.clone(),
            deps,
            created: HashMap::new(),
        }
    }

    /// 使用自定义流水线（测试中替换表单步骤）
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    async fn write_back_id(&self, row: usize, id: &str) {
        write_back_with_retry(
            self.deps.source.as_ref(),
            self.deps.operator.as_ref(),
            &self.manual,
            self.config.write_back.attempts,
            row,
            fields::WORKSPACE_ID,
            id,
        )
        .await;
    }

    /// 仅发布模式：工作区 ID 必须是数字
    fn existing_id(record: &Record, outcome: &mut RowOutcome) -> Option<String> {
        match record.get(fields::WORKSPACE_ID).map(str::trim) {
            Some(id) if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => {
                Some(id.to_string())
            }
            Some(other) => {
                outcome.error(format!(
                    "{} '{}' is not numeric, cannot publish",
                    fields::WORKSPACE_ID,
                    other
                ));
                None
            }
            None => {
                outcome.error(format!(
                    "Row has no {}, cannot publish",
                    fields::WORKSPACE_ID
                ));
                None
            }
        }
    }

    /// 创建项目：执行流水线或续用本次运行中已创建的项目
    ///
    /// # 返回
    /// 返回项目是否存在（可以继续发布）
    async fn create(
        &mut self,
        driver: &dyn PageDriver,
        ctx: &RowCtx,
        record: &Record,
        acc: &mut Accumulator,
        outcome: &mut RowOutcome,
    ) -> bool {
        if let Some(project) = self.created.get(&ctx.item.row) {
            info!(
                "{} Resuming project {} created earlier in this run",
                ctx, project.id
            );
            project.replay(acc, outcome);
            return true;
        }

        let env = StepEnv {
            ui: FormUi::new(driver, self.config.timeouts()),
            record,
            config: &self.config,
        };
        let report = self.pipeline.run(&env, acc).await;

        let warnings: Vec<String> = report
            .warnings()
            .map(str::to_string)
            .chain(acc.warnings.iter().cloned())
            .collect();
        for warning in &warnings {
            outcome.warn(warning.clone());
        }
        if let Some(fatal) = report.fatal() {
            outcome.error(fatal);
        }

        if let Some(id) = acc.workspace_id.clone() {
            outcome.correlation_id = Some(id.clone());
            self.created.insert(
                ctx.item.row,
                CreatedProject {
                    id: id.clone(),
                    warnings,
                    keywords_entered: acc.keywords_entered.clone(),
                    uploaded_files: acc.uploaded_files.clone(),
                },
            );
            self.write_back_id(ctx.item.row, &id).await;
        }
        report.fatal().is_none()
    }

    async fn update_registry(&self, record: &Record, outcome: &mut RowOutcome) {
        let (Some(registry), Some(id)) = (&self.deps.registry, outcome.correlation_id.clone())
        else {
            return;
        };
        let Some(url) = record.source_url() else {
            outcome.error("Registry update skipped: row has no source URL");
            return;
        };
        let project_url = self.config.site.project_url(&id);
        if let Err(e) = registry.mark_published(url, &project_url).await {
            outcome.error(format!("Registry update failed: {}", e));
        }
    }

    async fn nominate(&self, record: &Record, outcome: &mut RowOutcome) {
        let Some(nominator) = &self.deps.nominator else {
            return;
        };
        let Some(url) = record.source_url() else {
            return;
        };
        if self.config.operator.email.is_none() {
            outcome.warn("Nomination skipped: no operator email configured");
            return;
        }
        match nominator.nominate(url, &self.config.operator).await {
            Ok(()) => debug!("Nominated {}", url),
            Err(e) => outcome.warn(format!("Nomination failed: {}", e)),
        }
    }

    /// 写入输出表并打印摘要
    fn finish(
        &self,
        ctx: &RowCtx,
        record: Option<&Record>,
        acc: &Accumulator,
        outcome: &RowOutcome,
    ) -> Result<(), StoreError> {
        let mut values: Vec<(String, String)> = Vec::new();
        if let Some(record) = record {
            values.extend(
                record
                    .columns()
                    .filter(|(name, _)| *name != fields::WORKSPACE_ID)
                    .map(|(name, value)| (name.to_string(), value.unwrap_or_default().to_string())),
            );
        }
        values.push((
            fields::WORKSPACE_ID.to_string(),
            outcome.correlation_id.clone().unwrap_or_default(),
        ));
        values.push((fields::STATUS.to_string(), outcome.status_message()));
        values.push((
            fields::KEYWORDS_ENTERED.to_string(),
            acc.keywords_entered.join("; "),
        ));
        values.push((
            fields::FILE_EXTENSIONS.to_string(),
            file_extensions(acc).join(", "),
        ));
        let stats = DatasetStats::from_files(&acc.uploaded_files);
        values.push((fields::DATASET_ROWS.to_string(), stats.rows_text()));
        values.push((fields::DATASET_COLUMNS.to_string(), stats.columns_text()));
        values.push((fields::DATASET_SIZE.to_string(), stats.size_text()));
        values.push((
            fields::PROCESSED_AT.to_string(),
            Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        ));

        let stored = self
            .deps
            .output
            .upsert(outcome.source_url.as_deref(), &values);

        for line in outcome.summary_lines(ctx.ordinal) {
            println!("{}", line);
        }

        match stored {
            Ok(action) => {
                debug!("{} Output {:?}", ctx, action);
                Ok(())
            }
            Err(e) => {
                warn!("{} Output could not be saved: {}", ctx, e);
                Err(e)
            }
        }
    }
}

/// 上传文件的扩展名（去重、小写）
fn file_extensions(acc: &Accumulator) -> Vec<String> {
    acc.uploaded_files
        .iter()
        .filter_map(|f| f.extension())
        .map(|e| e.to_string_lossy().to_lowercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[async_trait]
impl RowRunner for RowProcessor {
    async fn begin_session(&mut self, driver: &dyn PageDriver) -> Result<(), DriverError> {
        sign_in(driver, &self.config, self.deps.operator.as_ref()).await
    }

    async fn run_row(
        &mut self,
        driver: &dyn PageDriver,
        ctx: RowCtx,
    ) -> Result<RowOutcome, RowAbort> {
        let row = ctx.item.row;
        let mut outcome = RowOutcome::new(row);
        let mut acc = Accumulator::default();

        // 1. 读取
        let record = match self.deps.source.read(row) {
            Ok(record) => record,
            Err(e) => {
                outcome.error(format!("Could not read row: {}", e));
                self.finish(&ctx, None, &acc, &outcome)?;
                return Ok(outcome);
            }
        };
        outcome.source_url = record.source_url().map(str::to_string);
        info!(
            "{} Processing: {}",
            ctx,
            truncate_text(record.get(fields::TITLE).unwrap_or("<untitled>"), 80)
        );

        // 2. 创建或读取已有 ID
        let mode = self.config.mode;
        let project_ready = match mode {
            Mode::OnlyPublish => {
                outcome.correlation_id = Self::existing_id(&record, &mut outcome);
                outcome.correlation_id.is_some()
            }
            Mode::Default | Mode::NoPublish => {
                self.create(driver, &ctx, &record, &mut acc, &mut outcome)
                    .await
            }
        };

        // 3. 发布
        let mut published = false;
        if mode != Mode::NoPublish && project_ready {
            match self
                .publish
                .publish(driver, &ctx, outcome.correlation_id.as_deref())
                .await
            {
                Ok(()) => published = true,
                Err(PublishFailure::Failed(msg)) => outcome.error(msg),
                Err(PublishFailure::Fatal(fatal)) => {
                    warn!("{} {}", ctx, fatal);
                    return Err(RowAbort::BatchFatal(fatal));
                }
            }
        }

        // 4. 登记表
        if published {
            self.update_registry(&record, &mut outcome).await;
        }

        // 5. 提名
        self.nominate(&record, &mut outcome).await;

        // 6. 输出
        self.finish(&ctx, Some(&record), &acc, &outcome)?;
        Ok(outcome)
    }

    async fn abandon_row(&mut self, ctx: RowCtx, reason: &str) -> Result<RowOutcome, AppError> {
        let mut outcome = RowOutcome::new(ctx.item.row);
        let mut acc = Accumulator::default();
        if let Some(project) = self.created.get(&ctx.item.row) {
            project.replay(&mut acc, &mut outcome);
        }
        outcome.error(reason.to_string());

        let record = self.deps.source.read(ctx.item.row).ok();
        outcome.source_url = record
            .as_ref()
            .and_then(|r| r.source_url())
            .map(str::to_string);
        self.finish(&ctx, record.as_ref(), &acc, &outcome)?;
        Ok(outcome)
    }
}
