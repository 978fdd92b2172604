//! 按标题建立数据目录

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MAX_NAME_CHARS: usize = 200;
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// 把标题转换成在 Windows 上也合法的目录名
pub fn sanitize_folder_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !c.is_ascii_control())
        .take(MAX_NAME_CHARS)
        .collect();

    if cleaned.is_empty() {
        "Untitled".to_string()
    } else {
        cleaned
    }
}

/// 创建（或清空已有的）标题目录
///
/// # 参数
/// - `base`: 数据根目录，不存在时创建
/// - `title`: 数据页标题
///
/// # 返回
/// 返回目录路径；清空旧内容失败只记录警告
pub fn prepare_title_folder(base: &Path, title: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(base)?;
    let folder = base.join(sanitize_folder_name(title));

    if folder.is_dir() {
        match clear_dir(&folder) {
            Ok(()) => info!("  Cleared existing folder: {}", folder.display()),
            Err(e) => warn!("  Could not clear existing folder {}: {}", folder.display(), e),
        }
    }

    fs::create_dir_all(&folder)?;
    Ok(folder)
}

fn clear_dir(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_characters_become_underscores() {
        assert_eq!(
            sanitize_folder_name("COVID-19: Cases/Deaths by \"State\"?"),
            "COVID-19_ Cases_Deaths by _State__"
        );
    }

    #[test]
    fn edges_and_control_characters_are_stripped() {
        assert_eq!(sanitize_folder_name(" ..Flu\tData.. "), "FluData");
        assert_eq!(sanitize_folder_name(" . "), "Untitled");
        assert_eq!(sanitize_folder_name(""), "Untitled");
    }

    #[test]
    fn long_titles_are_truncated() {
        let long = "a".repeat(250);
        assert_eq!(sanitize_folder_name(&long).chars().count(), 200);
    }

    #[test]
    fn existing_folder_is_cleared() {
        let root = tempfile::tempdir().unwrap();
        let first = prepare_title_folder(root.path(), "Flu Data").unwrap();
        fs::write(first.join("old.pdf"), b"x").unwrap();
        fs::create_dir(first.join("nested")).unwrap();

        let again = prepare_title_folder(root.path(), "Flu Data").unwrap();
        assert_eq!(first, again);
        assert_eq!(fs::read_dir(&again).unwrap().count(), 0);
    }
}
