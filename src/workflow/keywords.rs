//! 关键词解析
//!
//! 关键词来自三列（两列主题词 + 关键词列），每列是逗号或分号分隔的列表，
//! 可能带有引号和方括号（例如从 Python 列表直接导出的 `['a', 'b']`）。

/// 去掉的包裹字符
const WRAPPING: &[char] = &['\'', '"', '[', ']', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}'];

/// 把若干单元格拆分为关键词，保持出现顺序
pub fn split_keywords<'a>(cells: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    cells
        .into_iter()
        .flat_map(|cell| cell.split([',', ';']))
        .map(|token| {
            let stripped: String = token.chars().filter(|c| !WRAPPING.contains(c)).collect();
            stripped.trim().to_string()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

/// 去掉短于 `min_len` 个字符的噪声词以及重复词
pub fn drop_noise(tokens: Vec<String>, min_len: usize) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.chars().count() < min_len || kept.contains(&token) {
            continue;
        }
        kept.push(token);
    }
    kept
}
