//! 状态文件读写
//!
//! 状态文件只有一行，内容由各批处理系统自行定义。读取时只取第一行；
//! 写入时先写临时文件再重命名，调用方看到的要么是旧状态要么是新状态。

use crate::error::Result;
use std::fs::{self, DirBuilder};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

/// 状态目录的权限
pub const STATE_DIR_MODE: u32 = 0o750;

/// 读取状态文件的第一行
///
/// 文件不存在或第一行为空时返回 `None`，由调用方使用默认状态。
pub fn read_state(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "状态文件不存在");
        return Ok(None);
    }
    let file = fs::File::open(path)?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line)?;
    let line = line.trim();
    if line.is_empty() {
        Ok(None)
    } else {
        Ok(Some(line.to_string()))
    }
}

/// 写入状态
///
/// 父目录不存在时以 0750 权限创建。
pub fn write_state(path: &Path, state: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            DirBuilder::new()
                .recursive(true)
                .mode(STATE_DIR_MODE)
                .create(dir)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);
    {
        let mut file = fs::File::create(tmp_path)?;
        file.write_all(state.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    tracing::debug!(path = %path.display(), state, "状态已保存");
    Ok(())
}
