//! 上传应用 - 编排层
//!
//! ## 职责
//!
//! 运行开始前完成所有"立即失败"的检查，然后把组件装配起来交给批次控制器：
//!
//! 1. 配置检查，输出文件可写性检查
//! 2. 连接远端登记表并校验必需列（在处理任何行之前）
//! 3. 初始化运行日志文件
//! 4. 装配行处理器、会话工厂与控制器并运行
//! 5. 输出最终统计

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, Mode};
use crate::error::{AppResult, ConfigError};
use crate::models::{fields, WorkItem};
use crate::orchestrator::batch_controller::{BatchController, ControllerSettings, RunReport};
use crate::orchestrator::session::ChromeSessionFactory;
use crate::services::{
    ConsoleOperator, CsvOutputStore, CsvRowSource, HttpNominator, Nominator, Operator,
    RegistryUpdater, SheetsRegistry,
};
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};
use crate::workflow::{RowDeps, RowProcessor};

/// 上传应用
pub struct App {
    config: Config,
    items: Vec<WorkItem>,
    deps: RowDeps,
}

impl App {
    /// 初始化应用
    ///
    /// # 参数
    /// - `config`: 已合并命令行参数的配置
    /// - `items`: 要处理的行
    pub async fn initialize(config: Config, items: Vec<WorkItem>) -> AppResult<Self> {
        config.validate()?;

        let output = CsvOutputStore::new(&config.output_csv, fields::SOURCE_URL);
        output
            .probe()
            .map_err(|e| ConfigError::OutputNotWritable {
                path: config.output_csv.clone(),
                reason: e.to_string(),
            })?;

        let source = CsvRowSource::new(&config.input_csv);
        match source.row_count() {
            Ok(count) => info!("✓ Input {} has {} data row(s)", config.input_csv.display(), count),
            Err(e) => warn!("⚠️ Input could not be read yet: {}", e),
        }

        let registry = match config.registry.clone() {
            Some(settings) => {
                info!("Connecting to registry sheet '{}'...", settings.sheet_name);
                let updater = RegistryUpdater::connect(Box::new(SheetsRegistry::new(settings))).await?;
                info!("✓ Registry columns found");
                Some(updater)
            }
            None => None,
        };

        let nominator: Option<Box<dyn Nominator>> = if config.nomination.enabled {
            Some(Box::new(HttpNominator::new(config.nomination.clone())))
        } else {
            None
        };

        if let Err(e) = init_log_file(&config.output_log_file) {
            warn!("⚠️ Log file {} could not be created: {}", config.output_log_file, e);
        }

        let operator: Arc<dyn Operator> = Arc::new(ConsoleOperator);
        let deps = RowDeps {
            source: Arc::new(source),
            output: Arc::new(output),
            operator,
            registry,
            nominator,
        };

        Ok(Self {
            config,
            items,
            deps,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(self) -> AppResult<RunReport> {
        let App {
            config,
            items,
            deps,
        } = self;

        if items.is_empty() {
            warn!("⚠️ No rows selected, nothing to do");
            return Ok(RunReport::default());
        }

        log_startup(items.len(), config.batch_size, mode_label(config.mode));

        let operator = deps.operator.clone();
        let processor = RowProcessor::new(&config, deps);
        let mut controller = BatchController::new(
            ChromeSessionFactory::new(&config),
            processor,
            operator,
            ControllerSettings {
                batch_size: config.batch_size,
                max_batch_fatal_restarts: config.max_batch_fatal_restarts,
                pause_at_end: config.pause_at_end,
            },
        );

        let report = controller.run(&items).await?;
        print_final_stats(
            report.success,
            report.partial,
            report.failed,
            report.restarts,
            &config.output_log_file,
        );
        Ok(report)
    }
}

fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Default => "create and publish",
        Mode::NoPublish => "create only",
        Mode::OnlyPublish => "publish only",
    }
}
