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

use crate::domain::models::task::{Task, TaskOverrides, TaskStatus};
use crate::domain::repositories::{RepositoryError, TaskRepository};
use crate::infrastructure::database::entities::task as task_entity;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 任务仓库实现
///
/// 基于SeaORM实现的任务数据访问层
#[derive(Clone)]
pub struct TaskRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl TaskRepositoryImpl {
    /// 创建新的任务仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    ///
    /// # 返回值
    ///
    /// 返回新的任务仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<task_entity::Model> for Task {
    fn from(model: task_entity::Model) -> Self {
        Self {
            id: model.id,
            status: model.status.parse().unwrap_or_default(),
            progress: model.progress,
            error: model.error,
            source_video_key: model.source_video_key,
            output_video_key: model.output_video_key,
            source_language: model.source_language,
            target_language: model.target_language,
            overrides: TaskOverrides {
                asr_app_key: model.asr_app_key,
                asr_access_key: model.asr_access_key,
                asr_resource_id: model.asr_resource_id,
                glm_api_key: model.glm_api_key,
                glm_api_url: model.glm_api_url,
                glm_model: model.glm_model,
                tts_backend: model.tts_backend,
                tts_service_url: model.tts_service_url,
                tts_api_key: model.tts_api_key,
            },
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<Task> for task_entity::ActiveModel {
    fn from(task: Task) -> Self {
        Self {
            id: Set(task.id),
            status: Set(task.status.to_string()),
            progress: Set(task.progress),
            error: Set(task.error),
            source_video_key: Set(task.source_video_key),
            output_video_key: Set(task.output_video_key),
            source_language: Set(task.source_language),
            target_language: Set(task.target_language),
            asr_app_key: Set(task.overrides.asr_app_key),
            asr_access_key: Set(task.overrides.asr_access_key),
            asr_resource_id: Set(task.overrides.asr_resource_id),
            glm_api_key: Set(task.overrides.glm_api_key),
            glm_api_url: Set(task.overrides.glm_api_url),
            glm_model: Set(task.overrides.glm_model),
            tts_backend: Set(task.overrides.tts_backend),
            tts_service_url: Set(task.overrides.tts_service_url),
            tts_api_key: Set(task.overrides.tts_api_key),
            created_at: Set(task.created_at),
            updated_at: Set(task.updated_at),
        }
    }
}

#[async_trait]
impl TaskRepository for TaskRepositoryImpl {
    async fn create(&self, task: &Task) -> Result<Task, RepositoryError> {
        let model: task_entity::ActiveModel = task.clone().into();
        model.insert(self.db.as_ref()).await?;
        Ok(task.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, RepositoryError> {
        let model = task_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn mark_running_if_queued(&self, id: Uuid) -> Result<(), RepositoryError> {
        task_entity::Entity::update_many()
            .col_expr(
                task_entity::Column::Status,
                Expr::value(TaskStatus::Running.to_string()),
            )
            .col_expr(task_entity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task_entity::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(task_entity::Column::Status.eq(TaskStatus::Created.to_string()))
                    .add(task_entity::Column::Status.eq(TaskStatus::Queued.to_string())),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), RepositoryError> {
        task_entity::Entity::update_many()
            .col_expr(
                task_entity::Column::Status,
                Expr::value(TaskStatus::Failed.to_string()),
            )
            .col_expr(task_entity::Column::Error, Expr::value(error.to_string()))
            .col_expr(task_entity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn mark_done(&self, id: Uuid, output_video_key: &str) -> Result<(), RepositoryError> {
        task_entity::Entity::update_many()
            .col_expr(
                task_entity::Column::Status,
                Expr::value(TaskStatus::Done.to_string()),
            )
            .col_expr(
                task_entity::Column::OutputVideoKey,
                Expr::value(output_video_key.to_string()),
            )
            .col_expr(task_entity::Column::Progress, Expr::value(100))
            .col_expr(task_entity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn set_progress(&self, id: Uuid, progress: i32) -> Result<(), RepositoryError> {
        task_entity::Entity::update_many()
            .col_expr(task_entity::Column::Progress, Expr::value(progress))
            .col_expr(task_entity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        task_entity::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}
