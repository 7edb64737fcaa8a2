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

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 配音任务实体
///
/// 表示一条待配音的视频及其在流水线中的全部状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 任务状态
    pub status: TaskStatus,
    /// 进度（0-100，仅供展示）
    pub progress: i32,
    /// 最近一次错误信息
    pub error: Option<String>,
    /// 源视频对象键
    pub source_video_key: String,
    /// 输出视频对象键
    pub output_video_key: Option<String>,
    /// 源语言
    pub source_language: String,
    /// 目标语言
    pub target_language: String,
    /// 任务级外部服务凭证覆盖
    pub overrides: TaskOverrides,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 更新时间
    pub updated_at: DateTime<FixedOffset>,
}

/// 任务级配置覆盖
///
/// 每个字段为空表示不覆盖，非空时优先于全局设置与环境变量
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOverrides {
    pub asr_app_key: Option<String>,
    pub asr_access_key: Option<String>,
    pub asr_resource_id: Option<String>,
    pub glm_api_key: Option<String>,
    pub glm_api_url: Option<String>,
    pub glm_model: Option<String>,
    pub tts_backend: Option<String>,
    pub tts_service_url: Option<String>,
    pub tts_api_key: Option<String>,
}

/// 任务状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 已创建
    #[default]
    Created,
    /// 已入队
    Queued,
    /// 处理中
    Running,
    /// 已失败
    Failed,
    /// 已完成
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStatus::Created => write!(f, "created"),
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(TaskStatus::Created),
            "queued" => Ok(TaskStatus::Queued),
            "running" => Ok(TaskStatus::Running),
            "failed" => Ok(TaskStatus::Failed),
            "done" => Ok(TaskStatus::Done),
            _ => Err(()),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition")]
    InvalidStateTransition,
}

impl Task {
    /// 创建一个新的配音任务
    ///
    /// # 参数
    ///
    /// * `source_video_key` - 源视频对象键
    /// * `source_language` - 源语言
    /// * `target_language` - 目标语言
    ///
    /// # 返回值
    ///
    /// 返回新创建的任务实例
    pub fn new(source_video_key: String, source_language: String, target_language: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Created,
            progress: 0,
            error: None,
            source_video_key,
            output_video_key: None,
            source_language,
            target_language,
            overrides: TaskOverrides::default(),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    /// 任务入队
    pub fn enqueue(mut self) -> Result<Self, DomainError> {
        match self.status {
            TaskStatus::Created => {
                self.status = TaskStatus::Queued;
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 任务开始执行
    ///
    /// 第一个步骤进入 running 时调用；任务保持 queued 直至此刻
    pub fn start(mut self) -> Result<Self, DomainError> {
        match self.status {
            TaskStatus::Created | TaskStatus::Queued => {
                self.status = TaskStatus::Running;
                Ok(self)
            }
            TaskStatus::Running => Ok(self),
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 任务完成
    ///
    /// 仅允许从 Running 转换；由 mux_video 步骤成功后触发
    pub fn complete(mut self, output_video_key: String) -> Result<Self, DomainError> {
        match self.status {
            TaskStatus::Running => {
                self.status = TaskStatus::Done;
                self.output_video_key = Some(output_video_key);
                self.progress = 100;
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 标记任务失败
    ///
    /// 某步骤耗尽重试预算后触发；failed 不可自行恢复为 running
    pub fn fail(mut self, error: String) -> Result<Self, DomainError> {
        match self.status {
            TaskStatus::Queued | TaskStatus::Running => {
                self.status = TaskStatus::Failed;
                self.error = Some(error);
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }
}
