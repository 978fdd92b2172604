use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use datalumos_batch::audit::run_audit;
use datalumos_batch::collector::{run_collect, CollectRange};
use datalumos_batch::config::{Config, Mode};
use datalumos_batch::error::ConfigError;
use datalumos_batch::models::RowSelection;
use datalumos_batch::orchestrator::App;
use datalumos_batch::utils::logging;

#[derive(Parser)]
#[command(name = "datalumos-batch")]
#[command(about = "Batch upload of inventory rows to the DataLumos archive", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create (and publish) DataLumos projects for the selected rows
    Upload(UploadArgs),
    /// Collect CDC data pages from an agency inventory
    Collect(CollectArgs),
    /// List upload folders whose file count is not the expected one
    Audit(AuditArgs),
}

#[derive(Args)]
struct UploadArgs {
    /// Input CSV
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Output CSV
    #[arg(long)]
    output: Option<PathBuf>,
    /// First row to process (1-based, header excluded)
    #[arg(long, conflicts_with = "rows")]
    start_row: Option<usize>,
    /// Last row to process (inclusive)
    #[arg(long, requires = "start_row", conflicts_with = "rows")]
    end_row: Option<usize>,
    /// Rows as a list, e.g. "1,3,5,7-10"
    #[arg(long)]
    rows: Option<String>,
    /// Root folder of the upload files
    #[arg(long)]
    folder: Option<PathBuf>,
    /// Create projects without publishing
    #[arg(long, conflicts_with = "only_publish")]
    no_publish: bool,
    /// Publish projects already created (uses datalumos_id)
    #[arg(long)]
    only_publish: bool,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
    /// Rows per browser session
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    headless: bool,
    /// Connect to a running browser on this debug port
    #[arg(long)]
    debug_port: Option<u16>,
    /// Close the browser at the end without waiting for Enter
    #[arg(long)]
    no_pause: bool,
}

#[derive(Args)]
struct CollectArgs {
    /// Agency inventory CSV
    #[arg(long)]
    input: Option<PathBuf>,
    /// Collected data CSV
    #[arg(long)]
    output: Option<PathBuf>,
    /// Folder that receives one subfolder per title
    #[arg(long)]
    data_root: Option<PathBuf>,
    /// First eligible row to process (0-based)
    #[arg(long, default_value_t = 0)]
    start_row: usize,
    /// Number of eligible rows to process (default: all remaining)
    #[arg(long)]
    num_rows: Option<usize>,
    /// Show the browser while capturing pages
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
struct AuditArgs {
    /// CSV with path, URL and datalumos_id columns
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Root folder of the upload files
    #[arg(long)]
    folder: Option<PathBuf>,
    /// Expected number of files per folder
    #[arg(long)]
    expected: Option<usize>,
    /// Result log
    #[arg(long)]
    log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init(cli.verbose || config.verbose_logging);

    match cli.command {
        Commands::Upload(args) => {
            let selection = row_selection(&args)?;
            apply_upload_args(&mut config, args);
            let items = selection.work_items();
            info!("Selected {} row(s)", items.len());

            let report = App::initialize(config, items).await?.run().await?;
            if report.failed > 0 {
                info!("{} row(s) failed, see the summary lines above", report.failed);
            }
        }
        Commands::Collect(args) => {
            if let Some(input) = args.input {
                config.collect.inventory_csv = input;
            }
            if let Some(output) = args.output {
                config.collect.output_csv = output;
            }
            if let Some(root) = args.data_root {
                config.collect.data_root = root;
            }
            config.browser.headless = !args.debug;
            let range = CollectRange {
                start: args.start_row,
                count: args.num_rows,
            };
            run_collect(&config, range).await?;
        }
        Commands::Audit(args) => {
            if let Some(csv) = args.csv {
                config.input_csv = csv;
            }
            if let Some(folder) = args.folder {
                config.upload_root = folder;
            }
            if let Some(expected) = args.expected {
                config.expected_upload_files = expected;
            }
            if let Some(log) = args.log {
                config.audit.log_file = log;
            }
            run_audit(&config)?;
        }
    }

    Ok(())
}

fn row_selection(args: &UploadArgs) -> Result<RowSelection, ConfigError> {
    match (&args.rows, args.start_row, args.end_row) {
        (Some(list), _, _) => RowSelection::parse_list(list),
        (None, Some(start), end) => RowSelection::range(start, end.unwrap_or(start)),
        (None, None, _) => Err(ConfigError::Invalid(
            "select rows with --rows or --start-row/--end-row".into(),
        )),
    }
}

/// 命令行参数覆盖配置
fn apply_upload_args(config: &mut Config, args: UploadArgs) {
    if let Some(csv) = args.csv {
        config.input_csv = csv;
    }
    if let Some(output) = args.output {
        config.output_csv = output;
    }
    if let Some(folder) = args.folder {
        config.upload_root = folder;
    }
    if args.no_publish {
        config.mode = Mode::NoPublish;
    } else if args.only_publish {
        config.mode = Mode::OnlyPublish;
    }
    if args.username.is_some() {
        config.credentials.username = args.username;
    }
    if args.password.is_some() {
        config.credentials.password = args.password;
    }
    if let Some(size) = args.batch_size {
        config.batch_size = size;
    }
    if args.headless {
        config.browser.headless = true;
    }
    if args.debug_port.is_some() {
        config.browser.debug_port = args.debug_port;
    }
    if args.no_pause {
        config.pause_at_end = false;
    }
}
