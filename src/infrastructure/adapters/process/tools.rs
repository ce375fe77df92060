//! Tool Discovery - 启动时定位 sox / ffmpeg
//!
//! 显式配置的路径优先，否则在 PATH 中查找

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::application::pipeline::ToolPaths;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} not found in PATH")]
    NotFound(String),

    #[error("{} is not an executable file", .0.display())]
    NotExecutable(PathBuf),
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// 在给定的搜索路径中查找可执行文件
fn search(name: &str, search_path: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let search_path = search_path?;
    std::env::split_paths(search_path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn locate(
    name: &str,
    explicit: Option<&Path>,
    search_path: Option<&std::ffi::OsStr>,
) -> Result<PathBuf, ToolError> {
    match explicit {
        Some(path) if is_executable(path) => Ok(path.to_path_buf()),
        Some(path) => Err(ToolError::NotExecutable(path.to_path_buf())),
        None => search(name, search_path).ok_or_else(|| ToolError::NotFound(name.to_string())),
    }
}

/// 定位外部工具，任一缺失即返回错误
pub fn discover_tools(sox: Option<&Path>, ffmpeg: Option<&Path>) -> Result<ToolPaths, ToolError> {
    let search_path = std::env::var_os("PATH");
    let tools = ToolPaths {
        sox: locate("sox", sox, search_path.as_deref())?,
        ffmpeg: locate("ffmpeg", ffmpeg, search_path.as_deref())?,
    };

    tracing::info!(
        sox = %tools.sox.display(),
        ffmpeg = %tools.ffmpeg.display(),
        "External tools located"
    );
    Ok(tools)
}
