// Copyright 2025 dubrs contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::setting::Setting;
use crate::domain::repositories::{RepositoryError, SettingRepository, SettingUpsert};
use crate::infrastructure::database::entities::setting as setting_entity;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// 设置仓库实现
#[derive(Clone)]
pub struct SettingRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl SettingRepositoryImpl {
    /// 创建新的设置仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<setting_entity::Model> for Setting {
    fn from(model: setting_entity::Model) -> Self {
        Self {
            id: model.id,
            category: model.category,
            key: model.key,
            value: model.value,
            is_sensitive: model.is_sensitive,
            updated_at: model.updated_at,
        }
    }
}

#[async_trait]
impl SettingRepository for SettingRepositoryImpl {
    async fn load_all(&self) -> Result<Vec<Setting>, RepositoryError> {
        let models = setting_entity::Entity::find()
            .order_by_asc(setting_entity::Column::Category)
            .order_by_asc(setting_entity::Column::Key)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn find(&self, category: &str, key: &str) -> Result<Option<Setting>, RepositoryError> {
        let model = setting_entity::Entity::find()
            .filter(setting_entity::Column::Category.eq(category))
            .filter(setting_entity::Column::Key.eq(key))
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn upsert_many(&self, settings: &[SettingUpsert]) -> Result<(), RepositoryError> {
        if settings.is_empty() {
            return Ok(());
        }

        // 多行写入在同一事务内执行；任一行失败时整体回滚
        let txn = self.db.begin().await?;
        let now = Utc::now();

        for item in settings {
            let existing = setting_entity::Entity::find()
                .filter(setting_entity::Column::Category.eq(&item.category))
                .filter(setting_entity::Column::Key.eq(&item.key))
                .one(&txn)
                .await?;

            match existing {
                None => {
                    let model = setting_entity::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        category: Set(item.category.clone()),
                        key: Set(item.key.clone()),
                        value: Set(item.value.clone()),
                        is_sensitive: Set(item.is_sensitive),
                        updated_at: Set(now.into()),
                    };
                    model.insert(&txn).await?;
                }
                Some(existing) => {
                    let mut model: setting_entity::ActiveModel = existing.into();
                    model.value = Set(item.value.clone());
                    model.is_sensitive = Set(item.is_sensitive);
                    model.updated_at = Set(now.into());
                    model.update(&txn).await?;
                }
            }
        }

        txn.commit().await?;
        Ok(())
    }

    async fn delete(&self, category: &str, key: &str) -> Result<(), RepositoryError> {
        setting_entity::Entity::delete_many()
            .filter(setting_entity::Column::Category.eq(category))
            .filter(setting_entity::Column::Key.eq(key))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}
