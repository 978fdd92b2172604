//! 日志工具模块
//!
//! 提供日志初始化、运行日志文件头和批次横幅等输出辅助函数

use std::fs;
use std::io;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 输出
///
/// `RUST_LOG` 优先；否则默认 `info`，`verbose` 时为 `debug`。
/// 重复调用（测试中）不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化运行日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> io::Result<()> {
    let log_header = format!(
        "{}\nDataLumos upload log - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
}

/// 记录程序启动信息
///
/// # 参数
/// - `total_rows`: 待处理行数
/// - `batch_size`: 每个会话处理的行数
/// - `mode`: 运行模式描述
pub fn log_startup(total_rows: usize, batch_size: usize, mode: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 DataLumos batch upload ({})", mode);
    info!("📊 {} row(s), {} per browser session", total_rows, batch_size);
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `seq`: 批次序号
/// - `first_row` / `last_row`: 本批首尾行号
/// - `size`: 本批条目数
/// - `queued`: 本批之后仍在队列中的批次数
pub fn log_batch_start(seq: usize, first_row: usize, last_row: usize, size: usize, queued: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 Batch {}: rows {}-{} ({} item(s))", seq, first_row, last_row, size);
    info!("📋 {} batch(es) queued after this one", queued);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
pub fn log_batch_complete(seq: usize, success: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ Batch {} finished: {}/{} successful", seq, success, total);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `success` / `partial` / `failed`: 各状态行数
/// - `restarts`: 会话级错误引起的重启次数
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(
    success: usize,
    partial: usize,
    failed: usize,
    restarts: usize,
    log_file_path: &str,
) {
    let total = success + partial + failed;
    info!("\n{}", "=".repeat(60));
    info!("📊 Run complete");
    info!(
        "Finished at: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ Success: {}/{}", success, total);
    info!("⚠️ Partial: {}", partial);
    info!("❌ Failed: {}", failed);
    info!("🔁 Session restarts: {}", restarts);
    info!("{}", "=".repeat(60));
    info!("\nLog saved to: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_text("Flu Surveillance", 3), "Flu...");
        assert_eq!(truncate_text("流感监测数据", 2), "流感...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn log_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        init_log_file(path.to_str().unwrap()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(&"=".repeat(60)));
        assert!(content.contains("DataLumos upload log"));
    }
}
