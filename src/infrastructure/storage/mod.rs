// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// MinIO（S3 兼容）后端
pub mod minio;

/// 阿里云 OSS 后端
pub mod oss;

use crate::config::resolver::EffectiveConfig;
use crate::domain::repositories::{ObjectStorage, StorageError};
use std::sync::Arc;
use tracing::warn;

pub use minio::MinioStorage;
pub use oss::OssStorage;

/// 根据有效配置构建对象存储网关
///
/// backend=oss 且 OSS 配置不完整时回退到 MinIO，
/// 允许 OSS 凭证稍后通过设置表补齐
///
/// # 参数
///
/// * `config` - 启动时解析的有效配置（环境 + 设置表）
///
/// # 返回值
///
/// * `Ok(Arc<dyn ObjectStorage>)` - 对象存储网关
/// * `Err(StorageError)` - 所选后端初始化失败
pub fn from_config(config: &EffectiveConfig) -> Result<Arc<dyn ObjectStorage>, StorageError> {
    match config.storage.backend.as_str() {
        "oss" => match OssStorage::new(&config.storage.oss) {
            Ok(storage) => Ok(Arc::new(storage)),
            Err(StorageError::InvalidConfig(reason)) => {
                warn!(reason = %reason, "OSS 配置不完整，回退到 MinIO 后端");
                Ok(Arc::new(MinioStorage::new(&config.storage.minio)?))
            }
            Err(err) => Err(err),
        },
        "minio" => Ok(Arc::new(MinioStorage::new(&config.storage.minio)?)),
        other => Err(StorageError::InvalidConfig(format!(
            "unsupported storage backend: {other}"
        ))),
    }
}
