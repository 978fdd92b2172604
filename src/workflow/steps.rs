//! DataLumos 表单步骤 - 流程层
//!
//! 一个新项目的完整填写顺序：
//! 创建项目 → 展开所有分组 → 机构 → 摘要 → 原始发布地址 → 关键词 →
//! 地理范围 → 时间范围 → 数据类型 → 采集说明 → 上传文件

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{DriverError, DriverResult};
use crate::infrastructure::{wait_exact_count, Target};
use crate::models::{fields, Record, StepResult};
use crate::workflow::keywords::{drop_noise, split_keywords};
use crate::workflow::pipeline::{Accumulator, FormUi, Pipeline, Step, StepClass, StepEnv};

/// 摘要缺失时的提示
pub const SUMMARY_MANDATORY: &str =
    "The summary is mandatory for the DataLumos project! Please fill it in manually.";

/// 上传完成后每个文件出现一次的提示文字
pub const UPLOAD_DONE_TEXT: &str = "File added to queue for upload.";

/// 页面选择器
pub mod selectors {
    pub const NEW_PROJECT: &str = ".btn > span:nth-child(3)";
    pub const TITLE_INPUT: &str = "#title";
    pub const SAVE_PROJECT: &str = ".save-project";
    pub const CONTINUE_TO_WORKSPACE: &str = "Continue To Project Workspace";
    pub const EXPAND_ALL: &str = "#expand-init > span:nth-child(2)";
    pub const AGENCY_ADD: &str = "#groupAttr0 > div:nth-child(1) > div:nth-child(1) > div:nth-child(1) > a:nth-child(3) > span:nth-child(3)";
    pub const AGENCY_TAB: &str = "Organization/Agency";
    pub const ORG_NAME: &str = "#orgName";
    pub const SAVE_ORG: &str = ".save-org";
    pub const SUMMARY_EDIT: &str = "#edit-dcterms_description_0 > span:nth-child(2)";
    pub const EDITOR_FRAME: &str = "iframe.wysihtml5-sandbox";
    pub const SUMMARY_SAVE: &str = ".glyphicon-ok";
    pub const SOURCE_URL_EDIT: &str = "#edit-imeta_sourceURL_0 > span:nth-child(1) > span:nth-child(2)";
    pub const INLINE_INPUT: &str = ".editable-input > input:nth-child(1)";
    pub const INLINE_SAVE: &str = ".editable-submit";
    pub const KEYWORD_INPUT: &str = ".select2-search__field";
    pub const KEYWORD_OPTION: &str = "li.select2-results__option";
    pub const GEO_EDIT: &str = "#edit-dcterms_location_0 > span:nth-child(1) > span:nth-child(2)";
    pub const TIME_ADD: &str = "#groupAttr1 > div:nth-child(1) > div:nth-child(3) > div:nth-child(1) > a:nth-child(3) > span:nth-child(3)";
    pub const START_DATE: &str = "#startDate";
    pub const END_DATE: &str = "#endDate";
    pub const SAVE_DATES: &str = ".save-dates";
    pub const DATA_TYPES_EDIT: &str = "#disco_kindOfData_0 > span:nth-child(2)";
    pub const NOTES_EDIT: &str = "#edit-imeta_collectionNotes_0 > span:nth-child(2)";
    pub const UPLOAD_BUTTON: &str = "a.btn-primary:nth-child(3) > span:nth-child(4)";
    pub const DROP_ZONE: &str = ".col-md-offset-2 > span:nth-child(1)";
    pub const UPLOAD_CLOSE: &str = ".importFileModal > div:nth-child(3) > button:nth-child(1)";
}

/// 从工作区地址中提取项目 ID（`/datalumos/239104`）
pub fn extract_workspace_id(url: &str) -> Option<String> {
    let re = Regex::new(r"/datalumos/(\d+)").ok()?;
    re.captures(url).map(|c| c[1].to_string())
}

/// 上传目录：`root` 加上行内的相对路径（去掉开头的 `./`，兼容两种分隔符）
pub fn upload_dir(root: &Path, relative: &str) -> PathBuf {
    relative
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .fold(root.to_path_buf(), |dir, part| dir.join(part))
}

/// 目录下的所有文件，按文件名排序
pub fn list_upload_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// 组装 DataLumos 新项目流水线
pub fn datalumos_pipeline(config: &Config) -> Pipeline {
    Pipeline::new(vec![
        Box::new(CreateProject),
        Box::new(ExpandSections),
        Box::new(Agencies),
        Box::new(Summary),
        Box::new(SourceUrl),
        Box::new(Keywords {
            min_len: config.min_keyword_len,
        }),
        Box::new(GeographicCoverage),
        Box::new(TimePeriod),
        Box::new(DataTypes),
        Box::new(CollectionNotes),
        Box::new(UploadFiles {
            root: config.upload_root.clone(),
            expected: config.expected_upload_files,
        }),
    ])
}

// ========== 创建项目 ==========

/// 新建项目、保存标题并进入项目工作区
pub struct CreateProject;

#[async_trait]
impl Step for CreateProject {
    fn name(&self) -> &'static str {
        "create project"
    }

    fn class(&self) -> StepClass {
        StepClass::Essential
    }

    fn precheck(&self, record: &Record) -> Option<StepResult> {
        if record.has(fields::TITLE) {
            None
        } else {
            Some(StepResult::FatalError(
                "Row has no title, no project can be created".to_string(),
            ))
        }
    }

    async fn run(&self, env: &StepEnv<'_>, acc: &mut Accumulator) -> DriverResult<StepResult> {
        let ui = &env.ui;
        let title = env.record.project_title().unwrap_or_default();
        info!("[row {}] Creating project: {}", env.record.row, title);

        ui.click(&Target::css(selectors::NEW_PROJECT)).await?;
        ui.fill(&Target::css(selectors::TITLE_INPUT), &title).await?;
        ui.click(&Target::css(selectors::SAVE_PROJECT)).await?;
        ui.click(&Target::text("a", selectors::CONTINUE_TO_WORKSPACE))
            .await?;
        ui.settle().await?;

        let url = ui.current_url().await?;
        match extract_workspace_id(&url) {
            Some(id) => {
                info!("[row {}] ✓ Workspace ID: {}", env.record.row, id);
                acc.workspace_id = Some(id);
                Ok(StepResult::Completed)
            }
            None => Ok(StepResult::Warning(format!(
                "Could not extract workspace ID from URL: {}",
                url
            ))),
        }
    }
}

// ========== 展开分组 ==========

/// 先收起再展开，确保所有分组都处于展开状态
pub struct ExpandSections;

#[async_trait]
impl Step for ExpandSections {
    fn name(&self) -> &'static str {
        "expand sections"
    }

    async fn run(&self, env: &StepEnv<'_>, _acc: &mut Accumulator) -> DriverResult<StepResult> {
        let toggle = Target::css(selectors::EXPAND_ALL);
        env.ui.click(&toggle).await?;
        env.ui.click(&toggle).await?;
        Ok(StepResult::Completed)
    }
}

// ========== 机构 ==========

pub struct Agencies;

#[async_trait]
impl Step for Agencies {
    fn name(&self) -> &'static str {
        "agencies"
    }

    fn precheck(&self, record: &Record) -> Option<StepResult> {
        if record.has(fields::AGENCY) || record.has(fields::AGENCY2) {
            None
        } else {
            Some(StepResult::Skipped("no agency".into()))
        }
    }

    async fn run(&self, env: &StepEnv<'_>, _acc: &mut Accumulator) -> DriverResult<StepResult> {
        let ui = &env.ui;
        // 关闭自动补全下拉框：点标签 → 点包含机构字样的标签 → 点弹窗标题 → 按 Escape
        let dismiss = Target::css("label[for='orgName']")
            .or_containing("label", "Organization")
            .or_containing("label", "Agency")
            .or_css(".modal-header, .modal-title")
            .or_press(selectors::ORG_NAME, "Escape");

        for agency in [fields::AGENCY, fields::AGENCY2]
            .into_iter()
            .filter_map(|f| env.record.get(f))
        {
            ui.click(&Target::css(selectors::AGENCY_ADD)).await?;
            ui.click(&Target::text("a", selectors::AGENCY_TAB)).await?;
            ui.fill(&Target::css(selectors::ORG_NAME), agency).await?;
            ui.click_any(&dismiss).await?;
            ui.click(&Target::css(selectors::SAVE_ORG)).await?;
            debug!("[row {}] Agency added: {}", env.record.row, agency);
        }
        Ok(StepResult::Completed)
    }
}

// ========== 摘要 ==========

pub struct Summary;

#[async_trait]
impl Step for Summary {
    fn name(&self) -> &'static str {
        "summary"
    }

    fn precheck(&self, record: &Record) -> Option<StepResult> {
        if record.has(fields::SUMMARY) {
            None
        } else {
            Some(StepResult::Warning(SUMMARY_MANDATORY.to_string()))
        }
    }

    async fn run(&self, env: &StepEnv<'_>, _acc: &mut Accumulator) -> DriverResult<StepResult> {
        let text = env.record.get(fields::SUMMARY).unwrap_or_default();
        env.ui.click(&Target::css(selectors::SUMMARY_EDIT)).await?;
        env.ui
            .set_editor(&Target::css(selectors::EDITOR_FRAME), text)
            .await?;
        env.ui.click(&Target::css(selectors::SUMMARY_SAVE)).await?;
        Ok(StepResult::Completed)
    }
}

// ========== 行内编辑字段 ==========

/// 点击"编辑"后在行内输入框中填写并回车保存
async fn inline_edit(env: &StepEnv<'_>, edit: &str, value: &str) -> DriverResult<StepResult> {
    env.ui.click(&Target::css(edit)).await?;
    env.ui
        .fill_and_submit(&Target::css(selectors::INLINE_INPUT), value)
        .await?;
    Ok(StepResult::Completed)
}

fn require(record: &Record, field: &str) -> Option<StepResult> {
    if record.has(field) {
        None
    } else {
        Some(StepResult::Skipped(format!("{} is empty", field)))
    }
}

pub struct SourceUrl;

#[async_trait]
impl Step for SourceUrl {
    fn name(&self) -> &'static str {
        "original distribution url"
    }

    fn precheck(&self, record: &Record) -> Option<StepResult> {
        require(record, fields::SOURCE_URL)
    }

    async fn run(&self, env: &StepEnv<'_>, _acc: &mut Accumulator) -> DriverResult<StepResult> {
        let url = env.record.get(fields::SOURCE_URL).unwrap_or_default();
        inline_edit(env, selectors::SOURCE_URL_EDIT, url).await
    }
}

pub struct GeographicCoverage;

#[async_trait]
impl Step for GeographicCoverage {
    fn name(&self) -> &'static str {
        "geographic coverage"
    }

    fn precheck(&self, record: &Record) -> Option<StepResult> {
        require(record, fields::GEOGRAPHIC_COVERAGE)
    }

    async fn run(&self, env: &StepEnv<'_>, _acc: &mut Accumulator) -> DriverResult<StepResult> {
        let coverage = env
            .record
            .get(fields::GEOGRAPHIC_COVERAGE)
            .unwrap_or_default();
        inline_edit(env, selectors::GEO_EDIT, coverage).await
    }
}

// ========== 关键词 ==========

/// 逐个输入关键词并从下拉列表中选择完全匹配的项
///
/// 单个关键词失败只记录警告，继续处理后面的关键词。
pub struct Keywords {
    pub min_len: usize,
}

impl Keywords {
    fn tokens(&self, record: &Record) -> Vec<String> {
        let cells = [fields::SUBJECT_TERMS1, fields::SUBJECT_TERMS2, fields::KEYWORDS]
            .into_iter()
            .filter_map(|f| record.get(f));
        drop_noise(split_keywords(cells), self.min_len)
    }
}

#[async_trait]
impl Step for Keywords {
    fn name(&self) -> &'static str {
        "keywords"
    }

    fn precheck(&self, record: &Record) -> Option<StepResult> {
        if self.tokens(record).is_empty() {
            Some(StepResult::Skipped("no keywords".into()))
        } else {
            None
        }
    }

    async fn run(&self, env: &StepEnv<'_>, acc: &mut Accumulator) -> DriverResult<StepResult> {
        let tokens = self.tokens(env.record);
        let input = Target::css(selectors::KEYWORD_INPUT);
        let mut failed = 0;

        for token in &tokens {
            match enter_keyword(&env.ui, &input, token).await {
                Ok(()) => acc.keywords_entered.push(token.clone()),
                Err(e) => {
                    failed += 1;
                    acc.warnings.push(format!(
                        "Keyword '{}' could not be entered, add it manually: {}",
                        token, e
                    ));
                }
            }
        }

        info!(
            "[row {}] Keywords entered: {}/{}",
            env.record.row,
            tokens.len() - failed,
            tokens.len()
        );
        Ok(StepResult::Completed)
    }
}

/// 输入一个关键词并选择文字完全相同的下拉项
async fn enter_keyword(ui: &FormUi<'_>, input: &Target, token: &str) -> DriverResult<()> {
    ui.fill(input, token).await?;
    ui.click(&Target::text(selectors::KEYWORD_OPTION, token)).await
}

// ========== 时间范围 ==========

pub struct TimePeriod;

#[async_trait]
impl Step for TimePeriod {
    fn name(&self) -> &'static str {
        "time period"
    }

    fn precheck(&self, record: &Record) -> Option<StepResult> {
        if record.has(fields::TIME_START) || record.has(fields::TIME_END) {
            None
        } else {
            Some(StepResult::Skipped("no time period".into()))
        }
    }

    async fn run(&self, env: &StepEnv<'_>, _acc: &mut Accumulator) -> DriverResult<StepResult> {
        let ui = &env.ui;
        ui.click(&Target::css(selectors::TIME_ADD)).await?;
        if let Some(start) = env.record.get(fields::TIME_START) {
            ui.fill(&Target::css(selectors::START_DATE), start).await?;
        }
        if let Some(end) = env.record.get(fields::TIME_END) {
            ui.fill(&Target::css(selectors::END_DATE), end).await?;
        }
        ui.click(&Target::css(selectors::SAVE_DATES)).await?;
        Ok(StepResult::Completed)
    }
}

// ========== 数据类型 ==========

pub struct DataTypes;

#[async_trait]
impl Step for DataTypes {
    fn name(&self) -> &'static str {
        "data types"
    }

    fn precheck(&self, record: &Record) -> Option<StepResult> {
        require(record, fields::DATA_TYPES)
    }

    async fn run(&self, env: &StepEnv<'_>, _acc: &mut Accumulator) -> DriverResult<StepResult> {
        let data_type = env.record.get(fields::DATA_TYPES).unwrap_or_default();
        env.ui.click(&Target::css(selectors::DATA_TYPES_EDIT)).await?;
        // 选项文字前带空格，按包含匹配
        env.ui
            .click(&Target::containing("span", data_type.trim()))
            .await?;
        env.ui.click(&Target::css(selectors::INLINE_SAVE)).await?;
        Ok(StepResult::Completed)
    }
}

// ========== 采集说明 ==========

pub struct CollectionNotes;

#[async_trait]
impl Step for CollectionNotes {
    fn name(&self) -> &'static str {
        "collection notes"
    }

    fn precheck(&self, record: &Record) -> Option<StepResult> {
        match record.collection_notes() {
            Some(_) => None,
            None => Some(StepResult::Skipped("no collection notes".into())),
        }
    }

    async fn run(&self, env: &StepEnv<'_>, _acc: &mut Accumulator) -> DriverResult<StepResult> {
        let notes = env.record.collection_notes().unwrap_or_default();
        env.ui.click(&Target::css(selectors::NOTES_EDIT)).await?;
        env.ui
            .set_editor(&Target::css(selectors::EDITOR_FRAME), &notes)
            .await?;
        env.ui.click(&Target::css(selectors::INLINE_SAVE)).await?;
        Ok(StepResult::Completed)
    }
}

// ========== 上传文件 ==========

/// 把上传目录中的文件拖入上传区域，并等待每个文件的完成提示
pub struct UploadFiles {
    pub root: PathBuf,
    /// 预期文件数，0 表示不检查
    pub expected: usize,
}

#[async_trait]
impl Step for UploadFiles {
    fn name(&self) -> &'static str {
        "upload files"
    }

    fn precheck(&self, record: &Record) -> Option<StepResult> {
        require(record, fields::UPLOAD_PATH)
    }

    async fn run(&self, env: &StepEnv<'_>, acc: &mut Accumulator) -> DriverResult<StepResult> {
        let relative = env.record.get(fields::UPLOAD_PATH).unwrap_or_default();
        let dir = upload_dir(&self.root, relative);
        let files = list_upload_files(&dir).map_err(|e| {
            DriverError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", dir.display(), e),
            ))
        })?;

        if self.expected > 0 && files.len() != self.expected {
            return Ok(StepResult::Warning(format!(
                "Expected {} files in {}, found {}; upload them manually",
                self.expected,
                dir.display(),
                files.len()
            )));
        }
        if files.is_empty() {
            return Ok(StepResult::Skipped(format!("{} is empty", dir.display())));
        }

        let ui = &env.ui;
        ui.click(&Target::css(selectors::UPLOAD_BUTTON)).await?;
        let zone = Target::css(selectors::DROP_ZONE);
        ui.ready(&zone).await?;
        info!(
            "[row {}] Uploading {} file(s) from {}",
            env.record.row,
            files.len(),
            dir.display()
        );
        ui.driver().drop_files(&zone, &files).await?;

        // 完成提示的数量必须恰好等于文件数
        wait_exact_count(
            ui.driver(),
            &Target::text("span", UPLOAD_DONE_TEXT),
            files.len(),
            ui.timeouts().upload,
            ui.timeouts().poll,
        )
        .await?;
        info!("[row {}] ✓ Upload complete", env.record.row);

        ui.click(&Target::css(selectors::UPLOAD_CLOSE)).await?;
        acc.uploaded_files = files;
        Ok(StepResult::Completed)
    }
}
