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

use crate::domain::models::step::{StepKind, StepMetrics, StepStatus, TaskStep};
use crate::domain::repositories::{RepositoryError, StepRepository};
use crate::infrastructure::database::entities::task_step as step_entity;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 步骤仓库实现
#[derive(Clone)]
pub struct StepRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl StepRepositoryImpl {
    /// 创建新的步骤仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn model_to_step(model: step_entity::Model) -> Result<TaskStep, RepositoryError> {
    let step: StepKind = model
        .step
        .parse()
        .map_err(|_| RepositoryError::Database(DbErr::Custom(format!(
            "unknown step name in task_steps: {}",
            model.step
        ))))?;
    let status: StepStatus = model
        .status
        .parse()
        .map_err(|_| RepositoryError::Database(DbErr::Custom(format!(
            "unknown step status in task_steps: {}",
            model.status
        ))))?;
    let metrics = match model.metrics_json {
        Some(json) => serde_json::from_value::<StepMetrics>(json).ok(),
        None => None,
    };

    Ok(TaskStep {
        id: model.id,
        task_id: model.task_id,
        step,
        status,
        attempt: model.attempt,
        started_at: model.started_at,
        ended_at: model.ended_at,
        error: model.error,
        metrics,
    })
}

#[async_trait]
impl StepRepository for StepRepositoryImpl {
    async fn latest_attempt(
        &self,
        task_id: Uuid,
        step: StepKind,
    ) -> Result<Option<TaskStep>, RepositoryError> {
        let model = step_entity::Entity::find()
            .filter(step_entity::Column::TaskId.eq(task_id))
            .filter(step_entity::Column::Step.eq(step.as_str()))
            .order_by_desc(step_entity::Column::Attempt)
            .one(self.db.as_ref())
            .await?;

        model.map(model_to_step).transpose()
    }

    async fn upsert_attempt(
        &self,
        task_id: Uuid,
        step: StepKind,
        attempt: i32,
        status: StepStatus,
        error: Option<&str>,
        metrics: Option<&StepMetrics>,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let metrics_json = metrics
            .map(serde_json::to_value)
            .transpose()
            .unwrap_or(None);

        let existing = step_entity::Entity::find()
            .filter(step_entity::Column::TaskId.eq(task_id))
            .filter(step_entity::Column::Step.eq(step.as_str()))
            .filter(step_entity::Column::Attempt.eq(attempt))
            .one(self.db.as_ref())
            .await?;

        match existing {
            None => {
                let model = step_entity::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    task_id: Set(task_id),
                    step: Set(step.as_str().to_string()),
                    status: Set(status.to_string()),
                    attempt: Set(attempt),
                    started_at: Set(Some(now.into())),
                    ended_at: Set(match status {
                        StepStatus::Succeeded | StepStatus::Failed => Some(now.into()),
                        _ => None,
                    }),
                    error: Set(error.map(str::to_string)),
                    metrics_json: Set(metrics_json),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };
                model.insert(self.db.as_ref()).await?;
            }
            Some(existing) => {
                let mut model: step_entity::ActiveModel = existing.into();
                model.status = Set(status.to_string());
                model.error = Set(error.map(str::to_string));
                if metrics_json.is_some() {
                    model.metrics_json = Set(metrics_json);
                }
                if matches!(status, StepStatus::Succeeded | StepStatus::Failed) {
                    model.ended_at = Set(Some(now.into()));
                }
                model.updated_at = Set(now.into());
                model.update(self.db.as_ref()).await?;
            }
        }

        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<TaskStep>, RepositoryError> {
        let models = step_entity::Entity::find()
            .filter(step_entity::Column::TaskId.eq(task_id))
            .order_by_asc(step_entity::Column::Step)
            .order_by_asc(step_entity::Column::Attempt)
            .all(self.db.as_ref())
            .await?;

        models.into_iter().map(model_to_step).collect()
    }

    async fn count_succeeded(&self, task_id: Uuid) -> Result<u64, RepositoryError> {
        let count = step_entity::Entity::find()
            .filter(step_entity::Column::TaskId.eq(task_id))
            .filter(step_entity::Column::Status.eq(StepStatus::Succeeded.to_string()))
            .select_only()
            .column(step_entity::Column::Step)
            .distinct()
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }
}
