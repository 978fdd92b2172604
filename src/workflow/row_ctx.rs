//! 行处理上下文
//!
//! 封装"我正在处理第几个条目、哪一行"这一信息

use std::fmt::Display;

use crate::models::WorkItem;

/// 行处理上下文
#[derive(Debug, Clone, Copy)]
pub struct RowCtx {
    pub item: WorkItem,

    /// 本次运行中的序号（从 1 开始，仅用于日志和摘要）
    pub ordinal: usize,

    /// 所在批次序号
    pub batch_seq: usize,
}

impl RowCtx {
    pub fn new(item: WorkItem, ordinal: usize, batch_seq: usize) -> Self {
        Self {
            item,
            ordinal,
            batch_seq,
        }
    }
}

impl Display for RowCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[#{} row {} batch {}]",
            self.ordinal, self.item.row, self.batch_seq
        )
    }
}
