//! 操作员交互 - 业务能力层
//!
//! 只负责"提示并等待操作员确认"，调用方阻塞直到操作员回车。

use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use tracing::warn;

/// 操作员确认能力
#[async_trait]
pub trait Operator: Send + Sync {
    /// 打印提示并阻塞等待确认
    async fn confirm(&self, prompt: &str);
}

/// 终端操作员：从标准输入读取一行
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOperator;

#[async_trait]
impl Operator for ConsoleOperator {
    async fn confirm(&self, prompt: &str) {
        let prompt = prompt.to_string();
        let result = tokio::task::spawn_blocking(move || {
            print!("\n{}\n> ", prompt);
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok::<_, io::Error>(())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Operator prompt could not read stdin: {}", e),
            Err(e) => warn!("Operator prompt task failed: {}", e),
        }
    }
}
