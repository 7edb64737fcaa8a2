// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::setting::Setting;
use crate::domain::repositories::task_repository::RepositoryError;
use async_trait::async_trait;

/// 设置写入数据
#[derive(Debug, Clone)]
pub struct SettingUpsert {
    pub category: String,
    pub key: String,
    pub value: String,
    pub is_sensitive: bool,
}

/// 设置仓库特质
#[async_trait]
pub trait SettingRepository: Send + Sync {
    /// 读取全部设置行
    async fn load_all(&self) -> Result<Vec<Setting>, RepositoryError>;

    /// 按 `(category, key)` 读取单条设置
    async fn find(&self, category: &str, key: &str) -> Result<Option<Setting>, RepositoryError>;

    /// 批量 UPSERT 设置
    ///
    /// 多行写入在同一事务内执行，任一失败时整体回滚
    async fn upsert_many(&self, settings: &[SettingUpsert]) -> Result<(), RepositoryError>;

    /// 删除单条设置
    async fn delete(&self, category: &str, key: &str) -> Result<(), RepositoryError>;
}
