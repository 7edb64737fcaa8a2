// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::Task;
use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
}

/// 任务仓库特质
///
/// 定义任务数据访问接口；任务/步骤/分段状态以任务存储为唯一权威
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 创建新任务
    async fn create(&self, task: &Task) -> Result<Task, RepositoryError>;

    /// 根据ID查找任务
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, RepositoryError>;

    /// 首个步骤开始执行时将任务从 queued/created 置为 running
    ///
    /// 任务已处于 running 时为幂等空操作
    async fn mark_running_if_queued(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// 标记任务失败并记录最后错误
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), RepositoryError>;

    /// 标记任务完成并写入输出视频键
    async fn mark_done(&self, id: Uuid, output_video_key: &str) -> Result<(), RepositoryError>;

    /// 更新任务进度（仅供展示）
    async fn set_progress(&self, id: Uuid, progress: i32) -> Result<(), RepositoryError>;

    /// 删除任务（步骤与分段级联删除）
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}
