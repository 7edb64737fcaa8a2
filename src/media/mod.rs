// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// FFmpeg 命令封装
pub mod ffmpeg;

/// 字幕格式转换
pub mod subtitles;

use std::path::{Path, PathBuf};

/// 临时文件守卫
///
/// 作用域结束时删除文件，保证步骤的成功与失败路径都完成清理
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    /// 接管一个临时文件路径
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 返回路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 放弃清理并返回路径（调用方接管生命周期）
    pub fn into_path(mut self) -> PathBuf {
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.path.as_os_str().is_empty() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// 临时目录守卫
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    /// 创建目录并接管其清理
    pub fn create(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// 返回路径
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_file_removed_on_drop() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dubrs_guard_{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"x").unwrap();
        {
            let _guard = TempFile::new(&path);
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_file_into_path_keeps_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dubrs_guard_{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"x").unwrap();
        let kept = TempFile::new(&path).into_path();
        assert!(kept.exists());
        std::fs::remove_file(kept).unwrap();
    }

    #[test]
    fn test_temp_dir_removed_on_drop() {
        let path = std::env::temp_dir().join(format!("dubrs_dir_{}", uuid::Uuid::new_v4()));
        {
            let guard = TempDir::create(&path).unwrap();
            std::fs::write(guard.path().join("a.txt"), b"x").unwrap();
        }
        assert!(!path.exists());
    }
}
