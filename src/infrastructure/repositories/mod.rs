// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 分段仓库实现
pub mod segment_repo_impl;

/// 设置仓库实现
pub mod setting_repo_impl;

/// 步骤仓库实现
pub mod step_repo_impl;

/// 任务仓库实现
pub mod task_repo_impl;

pub use segment_repo_impl::SegmentRepositoryImpl;
pub use setting_repo_impl::SettingRepositoryImpl;
pub use step_repo_impl::StepRepositoryImpl;
pub use task_repo_impl::TaskRepositoryImpl;
