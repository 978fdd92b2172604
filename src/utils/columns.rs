//! 表头列名匹配

/// 在表头中查找列：先按名称精确匹配（忽略大小写和首尾空白），
/// 再找包含候选名的表头（反过来不算，短表头如 "URL" 不会吞掉长候选名）
///
/// # 参数
/// - `headers`: 表头
/// - `candidates`: 候选列名，按优先级排列
///
/// # 返回
/// 返回匹配列的下标
pub fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    for name in candidates {
        let name = name.trim().to_lowercase();
        if let Some(idx) = lowered.iter().position(|h| *h == name) {
            return Some(idx);
        }
    }

    for name in candidates {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        if let Some(idx) = lowered.iter().position(|h| h.contains(&name)) {
            return Some(idx);
        }
    }
    None
}

/// 0 起的列号转为表格列字母（0 → A，26 → AA）
pub fn column_letter(mut idx: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters.iter().rev().collect()
}
