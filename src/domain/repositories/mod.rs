// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 分段仓库接口
pub mod segment_repository;

/// 设置仓库接口
pub mod setting_repository;

/// 步骤仓库接口
pub mod step_repository;

/// 对象存储接口
pub mod storage_repository;

/// 任务仓库接口
pub mod task_repository;

pub use segment_repository::{NewSegment, SegmentRepository};
pub use setting_repository::{SettingRepository, SettingUpsert};
pub use step_repository::StepRepository;
pub use storage_repository::{ObjectStorage, StorageError};
pub use task_repository::{RepositoryError, TaskRepository};
