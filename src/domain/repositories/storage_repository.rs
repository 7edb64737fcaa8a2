// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 对象存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 对象不存在
    #[error("Object not found: {0}")]
    NotFound(String),

    /// 后端请求失败（网络、认证、服务端错误）
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// 存储配置无效
    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),
}

/// 对象存储特质
///
/// MinIO 与 OSS 两种后端的统一接口。`put` 为覆盖写；不同尝试对同一键
/// 的写入视为幂等覆盖
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// 上传字节数据
    async fn put_bytes(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// 上传本地文件
    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// 下载对象为字节数据
    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// 下载对象到本地文件
    async fn get_to_file(&self, key: &str, path: &Path) -> Result<(), StorageError>;

    /// 删除对象
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// 检查对象是否存在
    ///
    /// 仅真实的 404 返回 false，其他错误原样上抛
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// 生成带过期时间的预签名 GET URL
    ///
    /// 可能过期的旧 URL 一律重新签发，调用方不得缓存超过有效期
    async fn presigned_get_url(&self, key: &str, expiry: Duration)
        -> Result<String, StorageError>;
}
