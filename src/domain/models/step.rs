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

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 流水线步骤种类
///
/// 步骤图是一条静态链（tts 内部扇出），用枚举加 `next()` 表达，
/// 不需要运行时可变的图结构
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// 音频提取
    ExtractAudio,
    /// 语音识别
    Asr,
    /// 文本翻译
    Translate,
    /// 语音合成（含汇合点）
    Tts,
    /// 视频合成
    MuxVideo,
}

impl StepKind {
    /// 按流水线顺序返回所有步骤
    pub fn all() -> [StepKind; 5] {
        [
            StepKind::ExtractAudio,
            StepKind::Asr,
            StepKind::Translate,
            StepKind::Tts,
            StepKind::MuxVideo,
        ]
    }

    /// 返回步骤名
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ExtractAudio => "extract_audio",
            StepKind::Asr => "asr",
            StepKind::Translate => "translate",
            StepKind::Tts => "tts",
            StepKind::MuxVideo => "mux_video",
        }
    }

    /// 返回后继步骤；mux_video 是终点
    pub fn next(&self) -> Option<StepKind> {
        match self {
            StepKind::ExtractAudio => Some(StepKind::Asr),
            StepKind::Asr => Some(StepKind::Translate),
            StepKind::Translate => Some(StepKind::Tts),
            StepKind::Tts => Some(StepKind::MuxVideo),
            StepKind::MuxVideo => None,
        }
    }

    /// 步骤对应的路由键与队列名（二者相同）
    pub fn routing_key(&self) -> String {
        format!("task.{}", self.as_str())
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extract_audio" => Ok(StepKind::ExtractAudio),
            "asr" => Ok(StepKind::Asr),
            "translate" => Ok(StepKind::Translate),
            "tts" => Ok(StepKind::Tts),
            "mux_video" => Ok(StepKind::MuxVideo),
            _ => Err(()),
        }
    }
}

/// 步骤状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// 待执行
    #[default]
    Pending,
    /// 执行中
    Running,
    /// 已成功
    Succeeded,
    /// 已失败
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for StepStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "succeeded" => Ok(StepStatus::Succeeded),
            "failed" => Ok(StepStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 任务步骤实体
///
/// 每次尝试一行，追加为主；同一 `(task_id, step)` 下最新一次尝试的
/// 状态即该步骤的权威状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    /// 步骤记录唯一标识符
    pub id: Uuid,
    /// 所属任务ID
    pub task_id: Uuid,
    /// 步骤种类
    pub step: StepKind,
    /// 步骤状态
    pub status: StepStatus,
    /// 尝试序号（从 1 开始，随重试单调递增）
    pub attempt: i32,
    /// 开始时间
    pub started_at: Option<DateTime<FixedOffset>>,
    /// 结束时间
    pub ended_at: Option<DateTime<FixedOffset>>,
    /// 错误信息
    pub error: Option<String>,
    /// 执行指标
    pub metrics: Option<StepMetrics>,
}

/// 步骤执行指标
///
/// 成功结束时由引擎写入，随步骤行持久化
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepMetrics {
    pub duration_ms: i64,
    pub task_id: String,
    pub step: String,
    pub trace_id: String,
}
