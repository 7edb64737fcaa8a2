// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::step::{StepKind, StepMetrics, StepStatus, TaskStep};
use crate::domain::repositories::task_repository::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// 步骤仓库特质
///
/// 步骤行追加为主：每次尝试一行，`(task_id, step, attempt)` 唯一
#[async_trait]
pub trait StepRepository: Send + Sync {
    /// 读取某步骤最新一次尝试（按 attempt 倒序取第一行）
    async fn latest_attempt(
        &self,
        task_id: Uuid,
        step: StepKind,
    ) -> Result<Option<TaskStep>, RepositoryError>;

    /// 按 `(task_id, step, attempt)` 写入或更新步骤行
    ///
    /// 行不存在时插入（running 状态写 started_at）；已存在时更新状态，
    /// 终态（succeeded/failed）补写 ended_at。两条路径对重复投递都安全
    async fn upsert_attempt(
        &self,
        task_id: Uuid,
        step: StepKind,
        attempt: i32,
        status: StepStatus,
        error: Option<&str>,
        metrics: Option<&StepMetrics>,
    ) -> Result<(), RepositoryError>;

    /// 读取任务的全部步骤行（按 step、attempt 排序）
    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<TaskStep>, RepositoryError>;

    /// 统计任务已成功的不同步骤数（用于进度展示）
    async fn count_succeeded(&self, task_id: Uuid) -> Result<u64, RepositoryError>;
}
